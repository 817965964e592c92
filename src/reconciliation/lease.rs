//! Per-statement mutual exclusion for reconciliation passes

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::types::*;

/// Registry of statements that currently have a pass or override in flight
#[derive(Debug, Clone, Default)]
pub struct StatementLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl StatementLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for a statement without waiting
    ///
    /// Fails with [`ReconError::LockContention`] if it is already held.
    pub fn try_acquire(&self, statement_id: &str) -> ReconResult<StatementLease> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| ReconError::Storage("lease registry lock poisoned".to_string()))?;

        if !held.insert(statement_id.to_string()) {
            warn!(statement_id = %statement_id, "Statement lease already held");
            return Err(ReconError::LockContention(statement_id.to_string()));
        }

        Ok(StatementLease {
            statement_id: statement_id.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, statement_id: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(statement_id))
            .unwrap_or(false)
    }
}

/// Guard for a held statement lease; released on drop
#[derive(Debug)]
pub struct StatementLease {
    statement_id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl StatementLease {
    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }
}

impl Drop for StatementLease {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.statement_id);
        }
    }
}
