//! # Reconciliation Core
//!
//! Bank statement reconciliation: ingest parsed statement rows, pair each
//! bank transaction with an expense from the company ledger, and check the
//! statement's balances.
//!
//! ## Features
//!
//! - **Ingestion**: Row validation with partial success and pluggable transaction type classification
//! - **Matching**: Deterministic amount and date-window pairing with discrepancy detection
//! - **Reporting**: Variance report computed purely from signed transaction amounts
//! - **Overrides**: Sticky manual decisions that automatic passes never revisit
//! - **Storage abstraction**: Statement store and expense ledger are traits; an in-memory backend is included
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::utils::MemoryStorage;
//! use reconciliation_core::ReconciliationEngine;
//!
//! // MemoryStorage implements both StatementStore and ExpenseLedger
//! let storage = MemoryStorage::new();
//! let engine = ReconciliationEngine::new(storage.clone(), storage);
//! // engine.ingest(..), engine.reconcile(..), engine.get_report(..)
//! # let _ = engine;
//! ```

pub mod config;
pub mod ingest;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::ReconConfig;
pub use ingest::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
