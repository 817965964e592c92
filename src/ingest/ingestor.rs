//! Normalization of raw statement rows into bank transactions

use tracing::{info, instrument, warn};

use crate::ingest::KeywordClassifier;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_row;

/// Turns parsed statement rows into stored, unmatched bank transactions
pub struct TransactionIngestor<S: StatementStore> {
    store: S,
    classifier: Box<dyn TransactionClassifier>,
}

impl<S: StatementStore> TransactionIngestor<S> {
    /// Create an ingestor using the default keyword classifier
    pub fn new(store: S) -> Self {
        Self {
            store,
            classifier: Box::new(KeywordClassifier::new()),
        }
    }

    /// Create an ingestor with a custom classifier
    pub fn with_classifier(store: S, classifier: Box<dyn TransactionClassifier>) -> Self {
        Self { store, classifier }
    }

    /// Ingest one batch of rows for a statement
    ///
    /// Rows that fail validation are reported and skipped; the rest are
    /// stored. The statement ends `Processed` when it holds any transactions,
    /// from this batch or an earlier one, and `Error` when it holds none.
    #[instrument(skip(self, rows), fields(statement_id = %statement_id, rows = rows.len()))]
    pub async fn ingest(
        &self,
        statement_id: &str,
        rows: &[RawTransactionRow],
    ) -> ReconResult<IngestionReport> {
        let statement = self
            .store
            .get_statement(statement_id)
            .await?
            .ok_or_else(|| ReconError::StatementNotFound(statement_id.to_string()))?;

        self.store
            .update_statement_status(statement_id, StatementStatus::Processing, None)
            .await?;

        let mut accepted = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            match validate_row(index, row) {
                Ok((date, description, amount)) => {
                    if !statement.covers(date) {
                        warn!(
                            row = index,
                            date = %date,
                            "Transaction dated outside the statement period"
                        );
                    }

                    let (transaction_type, check_number) =
                        self.classifier
                            .classify(&description, &amount, row.raw_type.as_deref());

                    let mut transaction = BankTransaction::new(
                        uuid::Uuid::new_v4().to_string(),
                        statement_id.to_string(),
                        date,
                        description,
                        amount,
                        transaction_type,
                    );
                    transaction.check_number = check_number;
                    accepted.push(transaction);
                }
                Err(error) => {
                    warn!(
                        row = index,
                        field = %error.field,
                        reason = %error.reason,
                        "Rejected statement row"
                    );
                    errors.push(error);
                }
            }
        }

        let final_status = if accepted.is_empty() {
            let earlier = self.store.list_transactions(statement_id).await?;
            if earlier.is_empty() {
                let message = format!("No usable transactions in {} submitted rows", rows.len());
                self.store
                    .update_statement_status(statement_id, StatementStatus::Error, Some(message))
                    .await?;
                StatementStatus::Error
            } else {
                warn!(
                    stored = earlier.len(),
                    "Batch had no usable rows; statement keeps its earlier transactions"
                );
                self.store
                    .update_statement_status(statement_id, StatementStatus::Processed, None)
                    .await?;
                StatementStatus::Processed
            }
        } else {
            if let Err(e) = self.store.insert_transactions(&accepted).await {
                self.store
                    .update_statement_status(
                        statement_id,
                        StatementStatus::Error,
                        Some(format!("Failed to store transactions: {}", e)),
                    )
                    .await?;
                return Err(e);
            }
            self.store
                .update_statement_status(statement_id, StatementStatus::Processed, None)
                .await?;
            StatementStatus::Processed
        };

        info!(
            accepted = accepted.len(),
            rejected = errors.len(),
            status = %final_status,
            "Ingested statement rows"
        );

        Ok(IngestionReport {
            statement_id: statement_id.to_string(),
            accepted_count: accepted.len(),
            rejected_count: errors.len(),
            errors,
            transaction_ids: accepted.into_iter().map(|t| t.id).collect(),
            statement_status: final_status,
        })
    }
}
