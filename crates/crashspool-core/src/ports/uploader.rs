//! Uploader port (driven/secondary port)
//!
//! The uploader is the opaque capability that performs one upload attempt
//! against the receiving service. The coordinator never sees transport
//! details; it only consumes the three-way outcome.
//!
//! ## Design Notes
//!
//! - Implementations own their timeout. A timed-out attempt surfaces as
//!   [`UploadOutcome::Retryable`]; the coordinator imposes no additional
//!   timeout layer.
//! - The receiving service is expected to deduplicate by report identity,
//!   so re-attempting after an ambiguous failure is safe.

use crate::domain::CrashType;

/// Outcome of a single upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The report was accepted; `remote_id` is the identifier assigned by
    /// the receiving service, used for user-facing correlation.
    Success {
        /// Identifier assigned by the receiving service
        remote_id: String,
    },
    /// Transport-level failure (network error, timeout, server error).
    /// The attempt count is incremented and the report stays eligible
    /// until the retry gate closes.
    Retryable {
        /// Short description for logs
        reason: String,
    },
    /// The receiver rejected the report (malformed artifact, permanent
    /// refusal). The report is skipped immediately, regardless of
    /// remaining attempts.
    Terminal {
        /// Short description for logs
        reason: String,
    },
}

/// Port trait for the upload capability
#[async_trait::async_trait]
pub trait IUploader: Send + Sync {
    /// Perform one upload attempt with the raw report bytes and its
    /// classification metadata.
    async fn attempt(&self, payload: &[u8], crash_type: CrashType) -> UploadOutcome;
}
