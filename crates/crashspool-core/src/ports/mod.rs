//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IUploader`] - The opaque upload capability: one attempt against the
//!   crash collector, with its own transport and timeout
//! - [`IConsentProvider`] - Synchronous consent signal, queried immediately
//!   before each upload attempt

pub mod consent;
pub mod uploader;

pub use consent::{IConsentProvider, StaticConsent};
pub use uploader::{IUploader, UploadOutcome};
