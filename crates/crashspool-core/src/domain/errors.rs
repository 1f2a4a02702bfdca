//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including invalid state transitions and malformed identifiers.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid report state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    IllegalTransition {
        /// The current state
        from: &'static str,
        /// The attempted target state
        to: &'static str,
    },

    /// File name does not match the report naming grammar
    #[error("Invalid report file name: {0}")]
    InvalidName(String),

    /// Invalid owner identifier
    #[error("Invalid owner id: {0}")]
    InvalidOwner(String),

    /// Invalid local report identifier
    #[error("Invalid local id: {0}")]
    InvalidLocalId(String),
}
