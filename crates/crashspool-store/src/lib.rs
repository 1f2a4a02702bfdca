//! Crashspool Store - durable report persistence
//!
//! Provides:
//! - `ReportStore`: the spool directory owner. Ingestion, atomic-rename
//!   state transitions, quota eviction, retention sweeps.
//! - `UploadLog`: the append-only `uploads.log` manifest recording
//!   successful uploads. Exempt from all retention sweeps.
//!
//! All state lives in file names (see `crashspool_core::domain::report`);
//! the store never keeps in-memory state beyond the ingest critical
//! section, so concurrent processes observing the same directory agree.

pub mod error;
pub mod store;
pub mod upload_log;

pub use error::StoreError;
pub use store::{PurgeStats, Report, ReportStore, StoreLimits};
pub use upload_log::{UploadLog, UploadLogEntry, UPLOAD_LOG_FILENAME};
