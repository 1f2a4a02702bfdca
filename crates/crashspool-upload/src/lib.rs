//! Crashspool Upload - coordinator, classifier and HTTP uploader
//!
//! Provides:
//! - `UploadCoordinator`: selects eligible reports, drives attempts against
//!   the `IUploader` capability, applies the bounded-retry policy and reacts
//!   to connectivity, consent and forced-upload triggers
//! - `classify`: pure bounded-prefix classification of a report's process
//!   type, used for telemetry tagging only
//! - `HttpUploader`: `reqwest`-backed implementation of the uploader port

pub mod classifier;
pub mod coordinator;
pub mod http;

pub use classifier::classify;
pub use coordinator::{UploadCoordinator, UploadEvent, UploadStatus, UploadTrigger};
pub use http::HttpUploader;
