//! Manual overrides of transaction classification

use tracing::{info, instrument, warn};

use crate::config::ReconConfig;
use crate::reconciliation::lease::StatementLeases;
use crate::traits::*;
use crate::types::*;

/// Applies user decisions to individual transactions
///
/// Every change takes the statement lease, so overrides never interleave
/// with a reconciliation pass on the same statement.
pub struct StatusTracker<S: StatementStore, L: ExpenseLedger> {
    store: S,
    ledger: L,
    config: ReconConfig,
    leases: StatementLeases,
}

impl<S: StatementStore, L: ExpenseLedger> StatusTracker<S, L> {
    pub fn new(store: S, ledger: L, config: ReconConfig, leases: StatementLeases) -> Self {
        Self {
            store,
            ledger,
            config,
            leases,
        }
    }

    async fn load(&self, transaction_id: &str) -> ReconResult<BankTransaction> {
        self.store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| ReconError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Override a transaction's status
    ///
    /// With `confirm` set the new state becomes sticky: automatic passes skip
    /// the transaction until [`StatusTracker::clear_confirmation`] is called.
    /// Moving a linked transaction to a status that cannot carry a link
    /// releases its expense back to the candidate pool.
    #[instrument(skip(self, notes), fields(transaction_id = %transaction_id, status = %status))]
    pub async fn set_match_status(
        &self,
        transaction_id: &str,
        status: MatchStatus,
        notes: Option<String>,
        confirm: bool,
    ) -> ReconResult<BankTransaction> {
        let current = self.load(transaction_id).await?;
        let _lease = self.leases.try_acquire(&current.statement_id)?;
        // Re-read under the lease
        let mut txn = self.load(transaction_id).await?;

        let released = if status.allows_link() {
            None
        } else {
            txn.matched_expense_id.take()
        };
        if let Some(expense_id) = &released {
            self.ledger.unlink_expense(expense_id).await?;
            info!(expense_id = %expense_id, "Released expense back to the pool");
        }

        txn.match_status = status;
        if notes.is_some() {
            txn.match_notes = notes;
        } else if !status.allows_link() {
            txn.match_notes = None;
        }
        if confirm {
            txn.manually_confirmed = true;
        }

        if let Err(e) = self.store.update_transaction(&txn).await {
            // Put the released link back so ledger and store agree
            if let Some(expense_id) = &released {
                self.ledger.link_expense(expense_id, &txn.id).await?;
            }
            return Err(e);
        }

        info!(confirmed = txn.manually_confirmed, "Applied status override");
        Ok(txn)
    }

    /// Pair a transaction with a specific expense chosen by a user
    ///
    /// The expense must belong to the statement's company. The result is
    /// `Matched` when the amounts agree within the configured epsilon and
    /// `Discrepancy` otherwise; it is always confirmed.
    #[instrument(skip(self, notes), fields(transaction_id = %transaction_id, expense_id = %expense_id))]
    pub async fn link_manually(
        &self,
        transaction_id: &str,
        expense_id: &str,
        notes: Option<String>,
    ) -> ReconResult<BankTransaction> {
        let current = self.load(transaction_id).await?;
        let _lease = self.leases.try_acquire(&current.statement_id)?;
        let mut txn = self.load(transaction_id).await?;

        let statement = self
            .store
            .get_statement(&txn.statement_id)
            .await?
            .ok_or_else(|| ReconError::StatementNotFound(txn.statement_id.clone()))?;
        let expense = self
            .ledger
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| ReconError::ExpenseNotFound(expense_id.to_string()))?;

        if expense.company_id != statement.company_id {
            return Err(ReconError::Validation(format!(
                "Expense '{}' belongs to company '{}', statement '{}' to '{}'",
                expense_id, expense.company_id, statement.id, statement.company_id
            )));
        }

        let already_linked = match &expense.bank_transaction_id {
            Some(linked) if linked != &txn.id => {
                return Err(ReconError::LinkConflict {
                    expense_id: expense_id.to_string(),
                    linked_to: linked.clone(),
                });
            }
            Some(_) => true,
            None => false,
        };

        let previous = txn.matched_expense_id.clone();
        let replaced = previous.as_deref().filter(|p| *p != expense_id);
        if let Some(previous_id) = replaced {
            self.ledger.unlink_expense(previous_id).await?;
        }
        if let Err(e) = self.ledger.link_expense(expense_id, &txn.id).await {
            if let Some(previous_id) = replaced {
                self.ledger.link_expense(previous_id, &txn.id).await?;
            }
            return Err(e);
        }

        let gap = (txn.amount.abs() - expense.amount.abs()).abs();
        txn.match_status = if gap <= self.config.amount_epsilon {
            MatchStatus::Matched
        } else {
            MatchStatus::Discrepancy
        };
        txn.matched_expense_id = Some(expense_id.to_string());
        txn.match_notes = notes.or_else(|| Some("linked manually".to_string()));
        txn.manually_confirmed = true;

        if let Err(e) = self.store.update_transaction(&txn).await {
            warn!(error = %e, "Restoring expense links after failed update");
            if !already_linked {
                self.ledger.unlink_expense(expense_id).await?;
            }
            if let Some(previous_id) = replaced {
                self.ledger.link_expense(previous_id, &txn.id).await?;
            }
            return Err(e);
        }
        info!(status = %txn.match_status, "Linked transaction manually");
        Ok(txn)
    }

    /// Make a confirmed transaction eligible for automatic passes again
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn clear_confirmation(&self, transaction_id: &str) -> ReconResult<BankTransaction> {
        let current = self.load(transaction_id).await?;
        let _lease = self.leases.try_acquire(&current.statement_id)?;
        let mut txn = self.load(transaction_id).await?;

        txn.manually_confirmed = false;
        self.store.update_transaction(&txn).await?;
        info!("Cleared manual confirmation");
        Ok(txn)
    }
}
