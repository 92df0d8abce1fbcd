//! The atomic re-dating workflow: backup, write, verify, commit or roll
//! back.

pub mod backup;
pub mod transaction;
pub mod writer;

pub use backup::{BackupManager, BackupRecord};
pub use transaction::{
    FailureKind, TransactionOutcome, TransactionResult, TxCoordinator, TxState,
};
pub use writer::DateWriter;
