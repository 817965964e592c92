//! Main reconciliation orchestrator that coordinates ingestion, matching, and overrides

use tracing::instrument;

use crate::config::ReconConfig;
use crate::ingest::TransactionIngestor;
use crate::reconciliation::{
    MatchingEngine, ReconciliationReporter, StatementLeases, StatusTracker,
};
use crate::traits::*;
use crate::types::*;

/// Reconciliation system over one statement store and expense ledger
pub struct ReconciliationEngine<S: StatementStore, L: ExpenseLedger> {
    store: S,
    ingestor: TransactionIngestor<S>,
    matcher: MatchingEngine<S, L>,
    tracker: StatusTracker<S, L>,
    reporter: ReconciliationReporter,
    leases: StatementLeases,
}

impl<S: StatementStore + Clone, L: ExpenseLedger + Clone> ReconciliationEngine<S, L> {
    /// Create an engine with default configuration
    pub fn new(store: S, ledger: L) -> Self {
        Self::with_config(store, ledger, ReconConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(store: S, ledger: L, config: ReconConfig) -> Self {
        let ingestor = TransactionIngestor::new(store.clone());
        Self::assemble(store, ledger, config, ingestor)
    }

    /// Create an engine with a custom transaction classifier
    pub fn with_classifier(
        store: S,
        ledger: L,
        config: ReconConfig,
        classifier: Box<dyn TransactionClassifier>,
    ) -> Self {
        let ingestor = TransactionIngestor::with_classifier(store.clone(), classifier);
        Self::assemble(store, ledger, config, ingestor)
    }

    fn assemble(
        store: S,
        ledger: L,
        config: ReconConfig,
        ingestor: TransactionIngestor<S>,
    ) -> Self {
        let leases = StatementLeases::new();
        Self {
            ingestor,
            matcher: MatchingEngine::new(
                store.clone(),
                ledger.clone(),
                config.clone(),
                leases.clone(),
            ),
            tracker: StatusTracker::new(store.clone(), ledger, config.clone(), leases.clone()),
            reporter: ReconciliationReporter::new(&config),
            store,
            leases,
        }
    }

    /// Lease registry shared by passes and overrides of this engine
    pub fn leases(&self) -> &StatementLeases {
        &self.leases
    }

    pub fn config(&self) -> &ReconConfig {
        self.matcher.config()
    }

    // Statement operations
    /// Register an uploaded statement
    pub async fn create_statement(&self, statement: BankStatement) -> ReconResult<BankStatement> {
        if statement.period_end < statement.period_start {
            return Err(ReconError::Validation(format!(
                "Statement period ends ({}) before it starts ({})",
                statement.period_end, statement.period_start
            )));
        }
        self.store.save_statement(&statement).await?;
        Ok(statement)
    }

    /// Get a statement by ID
    pub async fn get_statement(&self, statement_id: &str) -> ReconResult<Option<BankStatement>> {
        self.store.get_statement(statement_id).await
    }

    /// List a statement's transactions
    pub async fn list_transactions(&self, statement_id: &str) -> ReconResult<Vec<BankTransaction>> {
        self.store.list_transactions(statement_id).await
    }

    /// Ingest parsed rows into a statement
    pub async fn ingest(
        &self,
        statement_id: &str,
        rows: &[RawTransactionRow],
    ) -> ReconResult<IngestionReport> {
        self.ingestor.ingest(statement_id, rows).await
    }

    // Matching operations
    /// Run a reconciliation pass over a statement
    pub async fn reconcile(&self, statement_id: &str) -> ReconResult<ReconciliationResult> {
        self.matcher.reconcile(statement_id).await
    }

    // Reporting operations
    /// Balance check for a statement
    #[instrument(skip(self), fields(statement_id = %statement_id))]
    pub async fn get_report(&self, statement_id: &str) -> ReconResult<VarianceReport> {
        let (statement, transactions) = self.load_statement(statement_id).await?;
        Ok(self.reporter.variance(&statement, &transactions))
    }

    /// Grouped transactions plus balance check for a statement
    pub async fn get_statement_report(&self, statement_id: &str) -> ReconResult<StatementReport> {
        let (statement, transactions) = self.load_statement(statement_id).await?;
        Ok(self.reporter.report(&statement, &transactions))
    }

    async fn load_statement(
        &self,
        statement_id: &str,
    ) -> ReconResult<(BankStatement, Vec<BankTransaction>)> {
        let statement = self
            .store
            .get_statement(statement_id)
            .await?
            .ok_or_else(|| ReconError::StatementNotFound(statement_id.to_string()))?;
        let transactions = self.store.list_transactions(statement_id).await?;
        Ok((statement, transactions))
    }

    // Override operations
    /// Apply and confirm a user's status decision
    pub async fn set_match_status(
        &self,
        transaction_id: &str,
        status: MatchStatus,
        notes: Option<String>,
    ) -> ReconResult<BankTransaction> {
        self.tracker
            .set_match_status(transaction_id, status, notes, true)
            .await
    }

    /// Apply a user's status decision, optionally leaving it open to automatic passes
    pub async fn set_match_status_with(
        &self,
        transaction_id: &str,
        status: MatchStatus,
        notes: Option<String>,
        confirm: bool,
    ) -> ReconResult<BankTransaction> {
        self.tracker
            .set_match_status(transaction_id, status, notes, confirm)
            .await
    }

    /// Pair a transaction with a user-chosen expense
    pub async fn link_manually(
        &self,
        transaction_id: &str,
        expense_id: &str,
        notes: Option<String>,
    ) -> ReconResult<BankTransaction> {
        self.tracker
            .link_manually(transaction_id, expense_id, notes)
            .await
    }

    /// Release a sticky override
    pub async fn clear_confirmation(&self, transaction_id: &str) -> ReconResult<BankTransaction> {
        self.tracker.clear_confirmation(transaction_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_engine_basic_operations() {
        let storage = MemoryStorage::new();
        let engine = ReconciliationEngine::new(storage.clone(), storage.clone());

        let statement = engine
            .create_statement(BankStatement::new(
                "stmt-1".to_string(),
                "acme".to_string(),
                "Operating".to_string(),
                "****1234".to_string(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                BigDecimal::from(1000),
                BigDecimal::from(750),
            ))
            .await
            .unwrap();

        storage
            .add_expense(CompanyExpense::new(
                "exp-1".to_string(),
                "acme".to_string(),
                NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                BigDecimal::from(250),
                "Office chairs".to_string(),
                "equipment".to_string(),
            ))
            .unwrap();

        let rows = vec![RawTransactionRow::new("2024-01-11", "FURNITURE DEPOT", "-250.00")];
        let ingested = engine.ingest(&statement.id, &rows).await.unwrap();
        assert_eq!(ingested.accepted_count, 1);

        let result = engine.reconcile(&statement.id).await.unwrap();
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.withdrawals_total, BigDecimal::from(250));

        let report = engine.get_report(&statement.id).await.unwrap();
        assert!(report.balanced);
        assert_eq!(report.calculated_ending_balance, BigDecimal::from(750));
    }

    #[tokio::test]
    async fn test_rejects_inverted_period() {
        let storage = MemoryStorage::new();
        let engine = ReconciliationEngine::new(storage.clone(), storage);

        let result = engine
            .create_statement(BankStatement::new(
                "stmt-1".to_string(),
                "acme".to_string(),
                "Operating".to_string(),
                "****1234".to_string(),
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                BigDecimal::from(0),
                BigDecimal::from(0),
            ))
            .await;
        assert!(matches!(result, Err(ReconError::Validation(_))));
    }
}
