//! Variance reporting over a statement's transactions

use bigdecimal::{BigDecimal, Zero};

use crate::config::ReconConfig;
use crate::types::*;

/// Sum inflows and outflows of a transaction list
///
/// Returns `(deposits, withdrawals)`, with withdrawals as a positive total.
/// Classification plays no part in either sum.
pub fn flow_totals(transactions: &[BankTransaction]) -> (BigDecimal, BigDecimal) {
    let mut deposits = BigDecimal::zero();
    let mut withdrawals = BigDecimal::zero();

    for txn in transactions {
        if txn.is_deposit() {
            deposits += &txn.amount;
        } else if txn.is_withdrawal() {
            withdrawals += txn.amount.abs();
        }
    }

    (deposits, withdrawals)
}

/// Stateless builder of statement reports
#[derive(Debug, Clone)]
pub struct ReconciliationReporter {
    balance_tolerance: BigDecimal,
}

impl Default for ReconciliationReporter {
    fn default() -> Self {
        Self::new(&ReconConfig::default())
    }
}

impl ReconciliationReporter {
    pub fn new(config: &ReconConfig) -> Self {
        Self {
            balance_tolerance: config.balance_tolerance.clone(),
        }
    }

    /// Compute the balance check for a statement
    pub fn variance(
        &self,
        statement: &BankStatement,
        transactions: &[BankTransaction],
    ) -> VarianceReport {
        let (deposits_total, withdrawals_total) = flow_totals(transactions);
        let calculated_ending_balance =
            &statement.beginning_balance + &deposits_total - &withdrawals_total;
        let variance = &statement.ending_balance - &calculated_ending_balance;
        let balanced = variance.abs() < self.balance_tolerance;

        VarianceReport {
            statement_id: statement.id.clone(),
            beginning_balance: statement.beginning_balance.clone(),
            ending_balance: statement.ending_balance.clone(),
            deposits_total,
            withdrawals_total,
            calculated_ending_balance,
            variance,
            balanced,
        }
    }

    /// Group transactions by classification and attach the balance check
    pub fn report(
        &self,
        statement: &BankStatement,
        transactions: &[BankTransaction],
    ) -> StatementReport {
        let mut matched = Vec::new();
        let mut discrepancies = Vec::new();
        let mut unmatched = Vec::new();
        let mut ignored = Vec::new();

        for txn in transactions {
            let group = match txn.match_status {
                MatchStatus::Matched => &mut matched,
                MatchStatus::Discrepancy => &mut discrepancies,
                MatchStatus::Unmatched => &mut unmatched,
                MatchStatus::Ignored => &mut ignored,
            };
            group.push(txn.clone());
        }

        StatementReport {
            matched,
            discrepancies,
            unmatched,
            ignored,
            variance: self.variance(statement, transactions),
        }
    }
}
