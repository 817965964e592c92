//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::types::*;

/// Persistence for statements and their transaction rows
///
/// Implementations must make [`StatementStore::apply_match_updates`] atomic:
/// either every update in the batch becomes visible or none does.
#[async_trait]
pub trait StatementStore: Send + Sync {
    /// Save a new statement
    async fn save_statement(&self, statement: &BankStatement) -> ReconResult<()>;

    /// Get a statement by ID
    async fn get_statement(&self, statement_id: &str) -> ReconResult<Option<BankStatement>>;

    /// Move a statement to a new processing status
    async fn update_statement_status(
        &self,
        statement_id: &str,
        status: StatementStatus,
        error_message: Option<String>,
    ) -> ReconResult<()>;

    /// Insert freshly ingested transactions
    async fn insert_transactions(&self, transactions: &[BankTransaction]) -> ReconResult<()>;

    /// List all transactions of a statement
    async fn list_transactions(&self, statement_id: &str) -> ReconResult<Vec<BankTransaction>>;

    /// Get a transaction by ID
    async fn get_transaction(&self, transaction_id: &str) -> ReconResult<Option<BankTransaction>>;

    /// Overwrite the match fields of a single transaction
    async fn update_transaction(&self, transaction: &BankTransaction) -> ReconResult<()>;

    /// Apply a batch of classification changes for one statement atomically
    async fn apply_match_updates(
        &self,
        statement_id: &str,
        updates: &[MatchUpdate],
    ) -> ReconResult<()>;
}

/// The external expense ledger, as far as reconciliation needs it
#[async_trait]
pub trait ExpenseLedger: Send + Sync {
    /// Expenses of a company that are not linked to any bank transaction
    async fn list_unlinked_expenses(&self, company_id: &str) -> ReconResult<Vec<CompanyExpense>>;

    /// Get an expense by ID
    async fn get_expense(&self, expense_id: &str) -> ReconResult<Option<CompanyExpense>>;

    /// Record that an expense is reconciled against a bank transaction
    ///
    /// Must fail with [`ReconError::LinkConflict`] when the expense is
    /// already linked to a different transaction.
    async fn link_expense(&self, expense_id: &str, transaction_id: &str) -> ReconResult<()>;

    /// Remove an expense's link, returning it to the candidate pool
    async fn unlink_expense(&self, expense_id: &str) -> ReconResult<()>;
}

/// Strategy for deriving a transaction type from statement text
pub trait TransactionClassifier: Send + Sync {
    /// Classify a row, returning its type and an extracted check number
    fn classify(
        &self,
        description: &str,
        amount: &BigDecimal,
        raw_type: Option<&str>,
    ) -> (TransactionType, Option<String>);
}
