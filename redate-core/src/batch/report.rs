//! Aggregated results of one batch run.

use crate::ops::{TransactionOutcome, TransactionResult};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Input-ordered outcomes plus aggregate counts. Read-only once built.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<TransactionOutcome>,
    pub committed: usize,
    pub rolled_back: usize,
    pub failed: usize,
    /// Paths whose rollback failed; these need a human
    pub needs_attention: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn from_results(results: Vec<TransactionOutcome>, duration: Duration) -> Self {
        let mut committed = 0;
        let mut rolled_back = 0;
        let mut failed = 0;
        let mut needs_attention = Vec::new();

        for outcome in &results {
            match &outcome.result {
                TransactionResult::Committed { .. } => committed += 1,
                TransactionResult::RolledBack { .. } => rolled_back += 1,
                TransactionResult::Failed { .. } => {
                    failed += 1;
                    if outcome.result.needs_manual_intervention() {
                        needs_attention.push(outcome.path.clone());
                    }
                }
            }
        }

        Self {
            results,
            committed,
            rolled_back,
            failed,
            needs_attention,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Every transaction committed
    pub fn is_clean(&self) -> bool {
        self.rolled_back == 0 && self.failed == 0
    }
}
