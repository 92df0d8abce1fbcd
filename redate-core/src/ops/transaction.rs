//! Transaction coordinator: sequences one backup → write → verify →
//! commit-or-rollback pass for a single file.
//!
//! Transient connectivity failures are retried under the configured
//! policy at each network step. Everything else terminates the
//! transaction: before the write that means plain failure, after it the
//! original timestamps are restored. A rollback that itself fails is
//! surfaced as a compounded error and flagged for manual intervention.

use super::backup::{BackupManager, BackupRecord};
use super::writer::DateWriter;
use crate::config::Config;
use crate::error::RedateError;
use crate::retry::{with_retry, RetryPolicy};
use crate::share::{catalog, ShareClient};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-transaction state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Pending,
    BackedUp,
    Written,
    Verified,
    Committed,
    RolledBack,
    Failed,
}

/// Coarse classification of a terminal failure, for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connectivity,
    Timeout,
    NotFound,
    PermissionDenied,
    UnsupportedTimestamp,
    VerificationMismatch,
    Restore,
    RollbackFailed,
    Cancelled,
    InvalidDocument,
    Io,
    Config,
}

impl From<&RedateError> for FailureKind {
    fn from(err: &RedateError) -> Self {
        match err {
            RedateError::Connectivity(_) => Self::Connectivity,
            RedateError::Timeout(_) => Self::Timeout,
            RedateError::NotFound(_) => Self::NotFound,
            RedateError::PermissionDenied(_) => Self::PermissionDenied,
            RedateError::UnsupportedTimestamp(_) => Self::UnsupportedTimestamp,
            RedateError::VerificationMismatch { .. } => Self::VerificationMismatch,
            RedateError::Restore { .. } => Self::Restore,
            RedateError::RollbackFailed { .. } => Self::RollbackFailed,
            RedateError::Cancelled => Self::Cancelled,
            RedateError::InvalidDocument(_) => Self::InvalidDocument,
            RedateError::Io(_) => Self::Io,
            RedateError::Config(_) => Self::Config,
        }
    }
}

/// Outcome of one date-change attempt. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionResult {
    /// The new timestamp is final; `applied` is what the share stored
    /// (possibly truncated to the protocol resolution)
    Committed { applied: DateTime<Utc> },

    /// The write or verification failed and the original timestamps were
    /// restored
    RolledBack { kind: FailureKind, reason: String },

    /// Nothing was mutated, or the rollback itself failed
    Failed {
        kind: FailureKind,
        reason: String,
        needs_manual_intervention: bool,
    },
}

impl TransactionResult {
    pub(crate) fn rolled_back(cause: &RedateError) -> Self {
        Self::RolledBack {
            kind: FailureKind::from(cause),
            reason: cause.to_string(),
        }
    }

    pub(crate) fn failed(cause: &RedateError) -> Self {
        Self::Failed {
            kind: FailureKind::from(cause),
            reason: cause.to_string(),
            needs_manual_intervention: cause.is_fatal(),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    pub fn needs_manual_intervention(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                needs_manual_intervention: true,
                ..
            }
        )
    }
}

/// One transaction's result plus its identity and timing
#[derive(Debug, Clone, Serialize)]
pub struct TransactionOutcome {
    pub id: Uuid,
    pub path: PathBuf,
    pub result: TransactionResult,
    pub duration_ms: u64,
}

impl TransactionOutcome {
    pub(crate) fn from_failure(path: PathBuf, cause: &RedateError) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            result: TransactionResult::failed(cause),
            duration_ms: 0,
        }
    }
}

pub struct TxCoordinator {
    backup: BackupManager,
    writer: DateWriter,
    policy: RetryPolicy,
    validate_documents: bool,
}

impl TxCoordinator {
    pub fn new(policy: RetryPolicy, capture_checksum: bool, validate_documents: bool) -> Self {
        Self {
            backup: BackupManager::new(capture_checksum),
            writer: DateWriter::new(),
            policy,
            validate_documents,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RetryPolicy::from_config(&config.retry),
            config.batch.verify_checksums,
            config.share.validate_pdfs,
        )
    }

    /// Run one full transaction. Errors never escape; every path ends in
    /// a `TransactionResult`.
    pub async fn execute(
        &self,
        client: &dyn ShareClient,
        path: &Path,
        target: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> TransactionOutcome {
        let id = Uuid::new_v4();
        let started = Instant::now();

        let result = self.run(client, path, target, cancel, id).await;
        match &result {
            TransactionResult::Committed { applied } => {
                info!("tx {}: committed {} -> {}", id, path.display(), applied);
            }
            TransactionResult::RolledBack { reason, .. } => {
                warn!("tx {}: rolled back {}: {}", id, path.display(), reason);
            }
            TransactionResult::Failed {
                reason,
                needs_manual_intervention,
                ..
            } => {
                if *needs_manual_intervention {
                    error!(
                        "tx {}: {} requires manual intervention: {}",
                        id,
                        path.display(),
                        reason
                    );
                } else {
                    warn!("tx {}: failed {}: {}", id, path.display(), reason);
                }
            }
        }

        TransactionOutcome {
            id,
            path: path.to_path_buf(),
            result,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run(
        &self,
        client: &dyn ShareClient,
        path: &Path,
        target: DateTime<Utc>,
        cancel: &CancellationToken,
        id: Uuid,
    ) -> TransactionResult {
        let mut state = TxState::Pending;

        if cancel.is_cancelled() {
            return TransactionResult::failed(&RedateError::Cancelled);
        }

        // An unrepresentable target can be rejected before any work
        if let Err(err) = super::writer::validate_target(target) {
            return TransactionResult::failed(&err);
        }

        if self.validate_documents {
            if let Err(err) = with_retry(&self.policy, "validate", || {
                catalog::validate_pdf(client, path)
            })
            .await
            {
                return TransactionResult::failed(&err);
            }
        }

        // Pending -> BackedUp: nothing mutated yet, a failure here has
        // nothing to roll back
        let record = match with_retry(&self.policy, "backup", || self.backup.begin(client, path))
            .await
        {
            Ok(record) => record,
            Err(err) => return TransactionResult::failed(&err),
        };
        transition(id, &mut state, TxState::BackedUp);

        // Last cancellation point: past here the write must run to a
        // terminal state
        if cancel.is_cancelled() {
            return TransactionResult::failed(&RedateError::Cancelled);
        }

        // BackedUp -> Written
        if let Err(err) = with_retry(&self.policy, "apply", || {
            self.writer.apply(client, path, target)
        })
        .await
        {
            return self.roll_back(client, &record, err, &mut state, id).await;
        }
        transition(id, &mut state, TxState::Written);

        // Written -> Verified
        let applied = match with_retry(&self.policy, "verify", || {
            self.writer.verify(client, path, target)
        })
        .await
        {
            Ok(applied) => applied,
            Err(err) => return self.roll_back(client, &record, err, &mut state, id).await,
        };
        transition(id, &mut state, TxState::Verified);

        // Verified -> Committed: the record is simply dropped
        transition(id, &mut state, TxState::Committed);
        TransactionResult::Committed { applied }
    }

    async fn roll_back(
        &self,
        client: &dyn ShareClient,
        record: &BackupRecord,
        cause: RedateError,
        state: &mut TxState,
        id: Uuid,
    ) -> TransactionResult {
        warn!(
            "tx {}: {} after {:?}, restoring original timestamps",
            id, cause, *state
        );

        match self.backup.restore(client, record).await {
            Ok(()) => {
                transition(id, state, TxState::RolledBack);
                TransactionResult::rolled_back(&cause)
            }
            Err(restore_err) => {
                transition(id, state, TxState::Failed);
                let compounded = RedateError::RollbackFailed {
                    original: Box::new(cause),
                    restore: Box::new(restore_err),
                };
                TransactionResult::failed(&compounded)
            }
        }
    }
}

fn transition(id: Uuid, state: &mut TxState, to: TxState) {
    debug!("tx {}: {:?} -> {:?}", id, *state, to);
    *state = to;
}
