//! Core types and data structures for statement reconciliation

use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing state of an uploaded bank statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    /// Uploaded, no transactions ingested yet
    Pending,
    /// An ingestion batch is in progress
    Processing,
    /// At least one transaction was ingested
    Processed,
    /// Ingestion yielded no usable transactions
    Error,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of movement a bank transaction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Check,
    Fee,
    Transfer,
    Other,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Check => "check",
            Self::Fee => "fee",
            Self::Transfer => "transfer",
            Self::Other => "other",
        }
    }

    /// Parse a type hint supplied by a statement parser or bank feed
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_lowercase().as_str() {
            "deposit" | "credit" | "dep" => Some(Self::Deposit),
            "withdrawal" | "debit" | "wd" | "pos" | "atm" => Some(Self::Withdrawal),
            "check" | "cheque" | "chk" => Some(Self::Check),
            "fee" | "charge" | "service_charge" => Some(Self::Fee),
            "transfer" | "xfer" => Some(Self::Transfer),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Classification of a bank transaction relative to the expense ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// No corresponding expense found
    Unmatched,
    /// Amount and date agree with a linked expense
    Matched,
    /// Date agrees with a linked expense but the amount differs
    Discrepancy,
    /// Excluded from reconciliation by a user
    Ignored,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Discrepancy => "discrepancy",
            Self::Ignored => "ignored",
        }
    }

    /// Whether a transaction in this state may carry an expense link
    pub fn allows_link(&self) -> bool {
        matches!(self, Self::Matched | Self::Discrepancy)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement metadata for one account and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankStatement {
    pub id: String,
    pub company_id: String,
    pub account_name: String,
    pub masked_account_number: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub beginning_balance: BigDecimal,
    pub ending_balance: BigDecimal,
    pub status: StatementStatus,
    /// Reason ingestion failed, when status is `Error`
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BankStatement {
    /// Create a freshly uploaded statement in `Pending` state
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        company_id: String,
        account_name: String,
        masked_account_number: String,
        period_start: NaiveDate,
        period_end: NaiveDate,
        beginning_balance: BigDecimal,
        ending_balance: BigDecimal,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            company_id,
            account_name,
            masked_account_number,
            period_start,
            period_end,
            beginning_balance,
            ending_balance,
            status: StatementStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a date falls inside the statement period
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.period_start && date <= self.period_end
    }
}

/// A single row of a bank statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: String,
    pub statement_id: String,
    pub transaction_date: NaiveDate,
    pub description: String,
    /// Signed amount: positive is an inflow, negative an outflow
    pub amount: BigDecimal,
    pub transaction_type: TransactionType,
    pub check_number: Option<String>,
    pub match_status: MatchStatus,
    pub match_notes: Option<String>,
    pub matched_expense_id: Option<String>,
    pub manually_confirmed: bool,
}

impl BankTransaction {
    /// Create an unmatched, unconfirmed transaction
    pub fn new(
        id: String,
        statement_id: String,
        transaction_date: NaiveDate,
        description: String,
        amount: BigDecimal,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            id,
            statement_id,
            transaction_date,
            description,
            amount,
            transaction_type,
            check_number: None,
            match_status: MatchStatus::Unmatched,
            match_notes: None,
            matched_expense_id: None,
            manually_confirmed: false,
        }
    }

    pub fn is_deposit(&self) -> bool {
        self.amount > BigDecimal::zero()
    }

    pub fn is_withdrawal(&self) -> bool {
        self.amount < BigDecimal::zero()
    }

    /// Whether an automatic pass may reclassify this transaction
    pub fn is_auto_eligible(&self) -> bool {
        !self.manually_confirmed
            && matches!(
                self.match_status,
                MatchStatus::Unmatched | MatchStatus::Discrepancy
            )
    }
}

/// Expense record owned by the external ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyExpense {
    pub id: String,
    pub company_id: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub description: String,
    pub category: String,
    pub billable: bool,
    pub invoice_id: Option<String>,
    /// Bank transaction this expense is reconciled against
    pub bank_transaction_id: Option<String>,
}

impl CompanyExpense {
    pub fn new(
        id: String,
        company_id: String,
        date: NaiveDate,
        amount: BigDecimal,
        description: String,
        category: String,
    ) -> Self {
        Self {
            id,
            company_id,
            date,
            amount,
            description,
            category,
            billable: false,
            invoice_id: None,
            bank_transaction_id: None,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.bank_transaction_id.is_some()
    }
}

/// Unvalidated row as produced by a statement parser or bank feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransactionRow {
    pub date: String,
    pub description: String,
    pub amount: String,
    pub raw_type: Option<String>,
}

impl RawTransactionRow {
    pub fn new(date: &str, description: &str, amount: &str) -> Self {
        Self {
            date: date.to_string(),
            description: description.to_string(),
            amount: amount.to_string(),
            raw_type: None,
        }
    }

    pub fn with_type(mut self, raw_type: &str) -> Self {
        self.raw_type = Some(raw_type.to_string());
        self
    }
}

/// Classification change for one transaction, applied in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub transaction_id: String,
    pub match_status: MatchStatus,
    pub match_notes: Option<String>,
    pub matched_expense_id: Option<String>,
}

/// Summary returned by a reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub statement_id: String,
    pub matched_count: usize,
    pub discrepancy_count: usize,
    pub unmatched_count: usize,
    pub ignored_count: usize,
    /// Transactions the pass was allowed to reclassify
    pub evaluated_count: usize,
    /// Confirmed or ignored transactions left untouched
    pub skipped_count: usize,
    pub deposits_total: BigDecimal,
    pub withdrawals_total: BigDecimal,
}

/// Balance check for a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceReport {
    pub statement_id: String,
    pub beginning_balance: BigDecimal,
    pub ending_balance: BigDecimal,
    pub deposits_total: BigDecimal,
    pub withdrawals_total: BigDecimal,
    pub calculated_ending_balance: BigDecimal,
    /// Declared ending balance minus calculated ending balance
    pub variance: BigDecimal,
    pub balanced: bool,
}

/// Transactions of a statement grouped by classification, with its variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementReport {
    pub matched: Vec<BankTransaction>,
    pub discrepancies: Vec<BankTransaction>,
    pub unmatched: Vec<BankTransaction>,
    pub ignored: Vec<BankTransaction>,
    pub variance: VarianceReport,
}

/// A row rejected during ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("row {row}: invalid {field} '{value}': {reason}")]
pub struct IngestionRowError {
    /// Zero-based position of the row in the submitted batch
    pub row: usize,
    pub field: String,
    pub value: String,
    pub reason: String,
}

/// Outcome of one ingestion batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub statement_id: String,
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub errors: Vec<IngestionRowError>,
    pub transaction_ids: Vec<String>,
    pub statement_status: StatementStatus,
}

/// Errors that can occur in the reconciliation system
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Statement not found: {0}")]
    StatementNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(String),
    #[error("Reconciliation already in progress for statement {0}")]
    LockContention(String),
    #[error("Expense {expense_id} is already linked to transaction {linked_to}")]
    LinkConflict {
        expense_id: String,
        linked_to: String,
    },
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;
