//! Statement row ingestion and transaction type classification

pub mod classifier;
pub mod ingestor;

pub use classifier::*;
pub use ingestor::*;
