//! Re-dating engine for files on mounted SMB/CIFS shares.
//!
//! Changes a file's modification timestamp atomically: the original
//! timestamps are captured first, the write is verified against what the
//! share actually stored, and any failure after the write restores the
//! original state. Batches run on a bounded worker pool over pooled share
//! connections, with per-path serialization and a full report no matter
//! how many files fail.

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod ops;
pub mod pool;
pub mod retry;
pub mod share;

// Re-export commonly used types
pub use batch::{BatchReport, BatchRunner};
pub use config::Config;
pub use error::{RedateError, Result};
pub use ops::{TransactionOutcome, TransactionResult, TxCoordinator};
pub use pool::SharePool;
pub use retry::RetryPolicy;
