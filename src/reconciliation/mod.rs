//! Reconciliation of bank statements against the expense ledger

pub mod engine;
pub mod lease;
pub mod matcher;
pub mod report;
pub mod status;

pub use engine::*;
pub use lease::*;
pub use matcher::*;
pub use report::*;
pub use status::*;
