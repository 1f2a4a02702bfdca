//! Consent provider port (driven/secondary port)
//!
//! Crash data leaves the machine only with user consent. The provider is
//! queryable synchronously so the coordinator can re-check it immediately
//! before every upload attempt; consent *changes* additionally arrive as
//! events on the coordinator's trigger channel.

use std::sync::atomic::{AtomicBool, Ordering};

/// Port trait for the consent signal
pub trait IConsentProvider: Send + Sync {
    /// Whether uploading crash data is currently permitted.
    fn granted(&self) -> bool;
}

/// Consent backed by a shared atomic flag.
///
/// Used by the daemon (seeded from configuration) and by tests that flip
/// consent mid-flight.
#[derive(Debug, Default)]
pub struct StaticConsent {
    granted: AtomicBool,
}

impl StaticConsent {
    /// Create a provider with the given initial state.
    #[must_use]
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    /// Update the consent state.
    pub fn set(&self, granted: bool) {
        self.granted.store(granted, Ordering::Release);
    }
}

impl IConsentProvider for StaticConsent {
    fn granted(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }
}
