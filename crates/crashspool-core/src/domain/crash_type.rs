//! Coarse crash classification
//!
//! A report is tagged with the process type that produced it, read from the
//! report payload by the classifier in the upload crate. The tag is used for
//! telemetry only and never affects upload eligibility.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Coarse process category of a crash report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashType {
    /// The main browser/host process
    Browser,
    /// A sandboxed renderer process
    Renderer,
    /// The GPU process
    Gpu,
    /// Anything unrecognized, including reports with no process-type marker
    Other,
}

impl CrashType {
    /// Stable lowercase label, used for metric labels and upload metadata.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            CrashType::Browser => "browser",
            CrashType::Renderer => "renderer",
            CrashType::Gpu => "gpu",
            CrashType::Other => "other",
        }
    }
}

impl Display for CrashType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(CrashType::Browser.label(), "browser");
        assert_eq!(CrashType::Renderer.label(), "renderer");
        assert_eq!(CrashType::Gpu.label(), "gpu");
        assert_eq!(CrashType::Other.to_string(), "other");
    }
}
