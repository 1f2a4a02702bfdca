//! Store error types

use std::path::PathBuf;

use crashspool_core::domain::DomainError;
use thiserror::Error;

/// Errors that can occur in store operations
///
/// Nothing here is fatal to the host process; every failure is local to a
/// single report and recoverable by a later retry cycle or sweep.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Read/write/rename failure. A failed state-transition rename degrades
    /// to deleting the source report, so callers never observe a report
    /// stuck between states.
    #[error("I/O error in report store")]
    Io(#[from] std::io::Error),

    /// The spool path exists but is not a directory
    #[error("{} exists but is not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    /// Ingestion source yielded more bytes than the configured limit.
    /// No report is created and no temporary file is left behind.
    #[error("source exceeds the report size limit of {limit} bytes")]
    TooLarge { limit: u64 },

    /// No report matches the given local id
    #[error("no report matches local id {0}")]
    NotFound(String),

    /// A state transition the naming grammar forbids
    #[error(transparent)]
    Transition(#[from] DomainError),
}
