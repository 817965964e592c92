//! Pairing of bank transactions with ledger expenses

use bigdecimal::{BigDecimal, Zero};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::ReconConfig;
use crate::reconciliation::lease::StatementLeases;
use crate::reconciliation::report::flow_totals;
use crate::traits::*;
use crate::types::*;

/// Classification decided for one transaction during a pass
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    /// Expense the transaction was linked to before the pass
    pub previous_expense_id: Option<String>,
    pub update: MatchUpdate,
}

impl MatchDecision {
    fn link_changed(&self) -> bool {
        self.previous_expense_id != self.update.matched_expense_id
    }
}

/// Classify transactions against a candidate pool, entirely in memory
///
/// Only transactions eligible for automatic classification should be
/// passed in. Transactions are resolved by ascending date, larger absolute
/// amounts first on the same date, and each expense is consumed by at most
/// one transaction.
pub fn plan_matches(
    transactions: &[BankTransaction],
    mut pool: Vec<CompanyExpense>,
    config: &ReconConfig,
) -> Vec<MatchDecision> {
    let mut ordered: Vec<&BankTransaction> = transactions.iter().collect();
    ordered.sort_by(|a, b| {
        a.transaction_date
            .cmp(&b.transaction_date)
            .then_with(|| b.amount.abs().cmp(&a.amount.abs()))
            .then_with(|| a.id.cmp(&b.id))
    });

    ordered
        .into_iter()
        .map(|txn| {
            let update = classify_one(txn, &mut pool, config);
            debug!(
                transaction_id = %txn.id,
                status = %update.match_status,
                expense_id = ?update.matched_expense_id,
                "Classified transaction"
            );
            MatchDecision {
                previous_expense_id: txn.matched_expense_id.clone(),
                update,
            }
        })
        .collect()
}

fn classify_one(
    txn: &BankTransaction,
    pool: &mut Vec<CompanyExpense>,
    config: &ReconConfig,
) -> MatchUpdate {
    let target = txn.amount.abs();
    let day_distance =
        |expense: &CompanyExpense| (expense.date - txn.transaction_date).num_days().abs();
    let amount_gap = |expense: &CompanyExpense| (expense.amount.abs() - &target).abs();

    let exact: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, expense)| {
            day_distance(expense) <= config.date_window_days
                && amount_gap(expense) <= config.amount_epsilon
        })
        .map(|(index, _)| index)
        .collect();

    let best = exact.iter().copied().min_by(|&a, &b| {
        day_distance(&pool[a])
            .cmp(&day_distance(&pool[b]))
            .then_with(|| pool[a].id.cmp(&pool[b].id))
    });
    if let Some(best) = best {
        let distance = day_distance(&pool[best]);
        let expense = pool.remove(best);
        let notes = if exact.len() == 1 {
            "matched by amount and date".to_string()
        } else {
            format!(
                "matched by amount and date; {} expenses share this amount, selected the nearest date ({} day(s) apart) with lowest expense id as tie-break",
                exact.len(),
                distance
            )
        };
        return MatchUpdate {
            transaction_id: txn.id.clone(),
            match_status: MatchStatus::Matched,
            match_notes: Some(notes),
            matched_expense_id: Some(expense.id),
        };
    }

    let nearest = pool
        .iter()
        .enumerate()
        .filter(|(_, expense)| {
            day_distance(expense) <= config.discrepancy_date_days
                && amount_gap(expense) > config.amount_epsilon
        })
        .min_by(|(_, a), (_, b)| {
            amount_gap(a)
                .cmp(&amount_gap(b))
                .then_with(|| day_distance(a).cmp(&day_distance(b)))
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(index, _)| index);

    if let Some(index) = nearest {
        let expense = pool.remove(index);
        let difference = &target - expense.amount.abs();
        let notes = format!(
            "amount differs from expense {} by {} (bank {}, expense {})",
            expense.id,
            format_signed_currency(&difference),
            format_currency(&target),
            format_currency(&expense.amount.abs()),
        );
        return MatchUpdate {
            transaction_id: txn.id.clone(),
            match_status: MatchStatus::Discrepancy,
            match_notes: Some(notes),
            matched_expense_id: Some(expense.id),
        };
    }

    MatchUpdate {
        transaction_id: txn.id.clone(),
        match_status: MatchStatus::Unmatched,
        match_notes: None,
        matched_expense_id: None,
    }
}

fn format_currency(value: &BigDecimal) -> String {
    format!("${}", value.round(2).with_scale(2))
}

fn format_signed_currency(value: &BigDecimal) -> String {
    match value.cmp(&BigDecimal::zero()) {
        Ordering::Less => format!("-{}", format_currency(&value.abs())),
        _ => format!("+{}", format_currency(value)),
    }
}

/// Inputs loaded and classified for one pass, not yet committed
#[derive(Debug)]
struct MatchPlan {
    transactions: Vec<BankTransaction>,
    decisions: Vec<MatchDecision>,
    skipped: usize,
}

/// Runs reconciliation passes over one store/ledger pair
pub struct MatchingEngine<S: StatementStore, L: ExpenseLedger> {
    store: S,
    ledger: L,
    config: ReconConfig,
    leases: StatementLeases,
}

impl<S: StatementStore, L: ExpenseLedger> MatchingEngine<S, L> {
    pub fn new(store: S, ledger: L, config: ReconConfig, leases: StatementLeases) -> Self {
        Self {
            store,
            ledger,
            config,
            leases,
        }
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    /// Reconcile a statement's open transactions against the expense ledger
    ///
    /// Holds the statement lease for the whole pass. Loading and matching
    /// are bounded by the configured timeout; nothing is written unless the
    /// pass reaches its commit.
    #[instrument(skip(self), fields(statement_id = %statement_id))]
    pub async fn reconcile(&self, statement_id: &str) -> ReconResult<ReconciliationResult> {
        let _lease = self.leases.try_acquire(statement_id)?;

        let statement = self
            .store
            .get_statement(statement_id)
            .await?
            .ok_or_else(|| ReconError::StatementNotFound(statement_id.to_string()))?;

        let plan = match timeout(self.config.pass_timeout(), self.prepare(&statement)).await {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                warn!(error = %e, "Reconciliation inputs could not be loaded");
                return Err(ReconError::ReconciliationFailed(format!(
                    "could not load inputs: {}",
                    e
                )));
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.pass_timeout_secs,
                    "Reconciliation pass timed out"
                );
                return Err(ReconError::ReconciliationFailed(format!(
                    "pass exceeded {}s timeout",
                    self.config.pass_timeout_secs
                )));
            }
        };

        self.commit(statement_id, &plan.decisions).await?;

        let result = summarize(statement_id, &plan);
        info!(
            matched = result.matched_count,
            discrepancies = result.discrepancy_count,
            unmatched = result.unmatched_count,
            evaluated = result.evaluated_count,
            skipped = result.skipped_count,
            "Reconciliation pass committed"
        );
        Ok(result)
    }

    async fn prepare(&self, statement: &BankStatement) -> ReconResult<MatchPlan> {
        let transactions = self.store.list_transactions(&statement.id).await?;
        let (eligible, frozen): (Vec<&BankTransaction>, Vec<&BankTransaction>) =
            transactions.iter().partition(|t| t.is_auto_eligible());

        // Expenses held by transactions this pass may not touch
        let reserved: HashSet<&str> = frozen
            .iter()
            .filter_map(|t| t.matched_expense_id.as_deref())
            .collect();

        let mut pool: Vec<CompanyExpense> = self
            .ledger
            .list_unlinked_expenses(&statement.company_id)
            .await?
            .into_iter()
            .filter(|e| !reserved.contains(e.id.as_str()))
            .collect();

        // Links of re-evaluated discrepancies go back into the pool
        for txn in &eligible {
            let Some(expense_id) = txn.matched_expense_id.as_deref() else {
                continue;
            };
            if pool.iter().any(|e| e.id == expense_id) {
                continue;
            }
            if let Some(expense) = self.ledger.get_expense(expense_id).await? {
                let held_by_this = expense
                    .bank_transaction_id
                    .as_deref()
                    .is_none_or(|linked| linked == txn.id);
                if expense.company_id == statement.company_id && held_by_this {
                    pool.push(expense);
                }
            }
        }

        debug!(
            eligible = eligible.len(),
            candidates = pool.len(),
            "Loaded reconciliation inputs"
        );

        let eligible: Vec<BankTransaction> = eligible.into_iter().cloned().collect();
        let decisions = plan_matches(&eligible, pool, &self.config);
        let skipped = frozen.len();

        Ok(MatchPlan {
            transactions,
            decisions,
            skipped,
        })
    }

    /// Write a plan: ledger links first, then the transaction batch
    ///
    /// Any failure undoes the ledger changes made so far, leaving prior
    /// state intact.
    async fn commit(&self, statement_id: &str, decisions: &[MatchDecision]) -> ReconResult<()> {
        let mut released: Vec<(String, String)> = Vec::new();
        let mut linked: Vec<String> = Vec::new();

        for decision in decisions.iter().filter(|d| d.link_changed()) {
            if let Some(previous) = &decision.previous_expense_id {
                if let Err(e) = self.ledger.unlink_expense(previous).await {
                    self.rollback(&released, &linked).await;
                    return Err(commit_failure(e));
                }
                released.push((previous.clone(), decision.update.transaction_id.clone()));
            }
        }

        for decision in decisions.iter().filter(|d| d.link_changed()) {
            if let Some(next) = &decision.update.matched_expense_id {
                if let Err(e) = self
                    .ledger
                    .link_expense(next, &decision.update.transaction_id)
                    .await
                {
                    self.rollback(&released, &linked).await;
                    return Err(commit_failure(e));
                }
                linked.push(next.clone());
            }
        }

        let updates: Vec<MatchUpdate> = decisions.iter().map(|d| d.update.clone()).collect();
        if let Err(e) = self.store.apply_match_updates(statement_id, &updates).await {
            self.rollback(&released, &linked).await;
            return Err(commit_failure(e));
        }

        Ok(())
    }

    async fn rollback(&self, released: &[(String, String)], linked: &[String]) {
        warn!(
            released = released.len(),
            linked = linked.len(),
            "Rolling back reconciliation links"
        );
        for expense_id in linked.iter().rev() {
            if let Err(e) = self.ledger.unlink_expense(expense_id).await {
                warn!(expense_id = %expense_id, error = %e, "Failed to undo expense link");
            }
        }
        for (expense_id, transaction_id) in released.iter().rev() {
            if let Err(e) = self.ledger.link_expense(expense_id, transaction_id).await {
                warn!(expense_id = %expense_id, error = %e, "Failed to restore expense link");
            }
        }
    }
}

fn commit_failure(error: ReconError) -> ReconError {
    match error {
        ReconError::LinkConflict { .. } => error,
        other => ReconError::ReconciliationFailed(format!("commit aborted: {}", other)),
    }
}

fn summarize(statement_id: &str, plan: &MatchPlan) -> ReconciliationResult {
    let mut matched_count = 0;
    let mut discrepancy_count = 0;
    let mut unmatched_count = 0;
    let mut ignored_count = 0;

    let decided: HashMap<&str, MatchStatus> = plan
        .decisions
        .iter()
        .map(|d| (d.update.transaction_id.as_str(), d.update.match_status))
        .collect();

    for txn in &plan.transactions {
        let status = decided
            .get(txn.id.as_str())
            .copied()
            .unwrap_or(txn.match_status);
        match status {
            MatchStatus::Matched => matched_count += 1,
            MatchStatus::Discrepancy => discrepancy_count += 1,
            MatchStatus::Unmatched => unmatched_count += 1,
            MatchStatus::Ignored => ignored_count += 1,
        }
    }

    let (deposits_total, withdrawals_total) = flow_totals(&plan.transactions);

    ReconciliationResult {
        statement_id: statement_id.to_string(),
        matched_count,
        discrepancy_count,
        unmatched_count,
        ignored_count,
        evaluated_count: plan.decisions.len(),
        skipped_count: plan.skipped,
        deposits_total,
        withdrawals_total,
    }
}
