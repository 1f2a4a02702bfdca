//! Report naming grammar
//!
//! A report's lifecycle state is encoded in its file name, not in sidecar
//! metadata. The grammar is:
//!
//! ```text
//! [{owner}_]{base}.{dmp|up|skipped|forced}{generation?}[.try{attempts}]
//! [{owner}_]{base}.tmp
//! ```
//!
//! - `owner` - decimal digits; identifies the producing application and
//!   drives the per-owner quota. A name whose leading `_`-delimited token is
//!   not all digits has no owner.
//! - `base` - opaque, dot-free identifier. Freshly ingested reports use a
//!   random 128-bit UUID. User-facing lookups match a local id as a suffix
//!   of the base.
//! - `generation` - optional digits directly after the state marker,
//!   disambiguating sidecar artifacts that share a base.
//! - `try{attempts}` - number of upload attempts made so far; absent means 0.
//!
//! This module is the only place the on-disk form is parsed
//! ([`ReportName::parse`]) or produced ([`ReportName::file_name`]). State
//! transitions are pure functions returning the renamed value; applying the
//! rename to the filesystem is the store's job.

use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

use super::errors::DomainError;
use super::newtypes::OwnerId;

/// State marker for reports that have not yet been uploaded
pub const PENDING_MARKER: &str = "dmp";
/// State marker for successfully uploaded reports (terminal)
pub const UPLOADED_MARKER: &str = "up";
/// State marker for reports whose upload was skipped
pub const SKIPPED_MARKER: &str = "skipped";
/// State marker for reports the user forced past the retry gate
pub const FORCED_MARKER: &str = "forced";
/// State marker for in-progress ingestion temporaries
pub const TEMPORARY_MARKER: &str = "tmp";

/// Delimiter introducing the attempt-count segment
const ATTEMPT_PREFIX: &str = "try";
/// Delimiter between the owner prefix and the rest of the name
const OWNER_DELIMITER: char = '_';

/// Lifecycle state of a report, as encoded by its name suffix
///
/// Exactly one state marker is present in a report name at any time.
/// `Uploaded` is terminal and carries no attempt count; a successful upload
/// strips any trailing attempt segment when renaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    /// Ingestion in progress; never visible to upload selection
    Temporary,
    /// Awaiting upload
    Pending {
        /// Upload attempts made so far
        attempts: u32,
    },
    /// Successfully uploaded (terminal)
    Uploaded,
    /// Upload was skipped (consent withheld or terminal failure)
    Skipped {
        /// Upload attempts made before the report was skipped
        attempts: u32,
    },
    /// User-forced upload; bypasses the retry gate
    Forced {
        /// Upload attempts made since the force
        attempts: u32,
    },
}

impl ReportState {
    /// Upload attempts recorded in this state (0 for attemptless states)
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            ReportState::Pending { attempts }
            | ReportState::Skipped { attempts }
            | ReportState::Forced { attempts } => *attempts,
            ReportState::Temporary | ReportState::Uploaded => 0,
        }
    }

    /// The suffix marker encoding this state
    #[must_use]
    pub const fn marker(&self) -> &'static str {
        match self {
            ReportState::Temporary => TEMPORARY_MARKER,
            ReportState::Pending { .. } => PENDING_MARKER,
            ReportState::Uploaded => UPLOADED_MARKER,
            ReportState::Skipped { .. } => SKIPPED_MARKER,
            ReportState::Forced { .. } => FORCED_MARKER,
        }
    }

    /// Lowercase state name for logs and error messages
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            ReportState::Temporary => "temporary",
            ReportState::Pending { .. } => "pending",
            ReportState::Uploaded => "uploaded",
            ReportState::Skipped { .. } => "skipped",
            ReportState::Forced { .. } => "forced",
        }
    }

    /// Whether this state is terminal (never renamed again)
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ReportState::Uploaded)
    }
}

impl Display for ReportState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parsed form of a report file name: identity plus lifecycle state
///
/// Identity (`owner`, `base`, `generation`) is stable across state
/// transitions; only the state (and its attempt count) changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportName {
    owner: Option<OwnerId>,
    base: String,
    generation: Option<u32>,
    state: ReportState,
}

impl ReportName {
    /// A freshly ingested pending report for `owner` with a random
    /// 128-bit base identifier.
    #[must_use]
    pub fn fresh(owner: OwnerId) -> Self {
        Self {
            owner: Some(owner),
            base: Uuid::new_v4().to_string(),
            generation: None,
            state: ReportState::Pending { attempts: 0 },
        }
    }

    /// A temporary name for an in-progress ingestion copy.
    #[must_use]
    pub fn temporary() -> Self {
        Self {
            owner: None,
            base: format!("spool-{}", Uuid::new_v4().simple()),
            generation: None,
            state: ReportState::Temporary,
        }
    }

    /// Parse a file name against the naming grammar.
    ///
    /// Returns `None` for names that are not reports (including the upload
    /// manifest and any foreign files sharing the spool directory). Such
    /// files are unowned and excluded from quota accounting and upload
    /// selection.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let (owner, rest) = match file_name.split_once(OWNER_DELIMITER) {
            Some((prefix, rest))
                if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) =>
            {
                (Some(OwnerId::new(prefix.parse().ok()?)), rest)
            }
            _ => (None, file_name),
        };

        let mut segments = rest.split('.');
        let base = segments.next()?;
        let marker = segments.next()?;
        let trailer = segments.next();
        if base.is_empty() || marker.is_empty() || segments.next().is_some() {
            return None;
        }

        if marker == TEMPORARY_MARKER {
            if trailer.is_some() {
                return None;
            }
            return Some(Self {
                owner,
                base: base.to_string(),
                generation: None,
                state: ReportState::Temporary,
            });
        }

        let digits_at = marker
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(marker.len());
        let (tag, generation_digits) = marker.split_at(digits_at);
        let generation = if generation_digits.is_empty() {
            None
        } else {
            Some(generation_digits.parse().ok()?)
        };

        let attempts = match trailer {
            None => 0,
            Some(segment) => segment.strip_prefix(ATTEMPT_PREFIX)?.parse().ok()?,
        };

        let state = match tag {
            PENDING_MARKER => ReportState::Pending { attempts },
            SKIPPED_MARKER => ReportState::Skipped { attempts },
            FORCED_MARKER => ReportState::Forced { attempts },
            // Uploaded is terminal and attemptless; a legacy trailing
            // attempt segment is tolerated and discarded.
            UPLOADED_MARKER => ReportState::Uploaded,
            _ => return None,
        };

        Some(Self {
            owner,
            base: base.to_string(),
            generation,
            state,
        })
    }

    /// Render the on-disk file name for this report.
    ///
    /// The attempt segment is only rendered for a non-zero count, so parsing
    /// and re-rendering normalizes an explicit `.try0`.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut name = String::new();
        if let Some(owner) = self.owner {
            name.push_str(&owner.to_string());
            name.push(OWNER_DELIMITER);
        }
        name.push_str(&self.base);
        name.push('.');
        name.push_str(self.state.marker());
        if self.state == ReportState::Temporary {
            return name;
        }
        if let Some(generation) = self.generation {
            name.push_str(&generation.to_string());
        }
        let attempts = self.state.attempts();
        if attempts > 0 {
            name.push('.');
            name.push_str(ATTEMPT_PREFIX);
            name.push_str(&attempts.to_string());
        }
        name
    }

    /// Owning application, if the name carries an owner prefix
    #[must_use]
    pub const fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    /// Stable base identifier, independent of lifecycle state
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Sidecar generation, if present
    #[must_use]
    pub const fn generation(&self) -> Option<u32> {
        self.generation
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> &ReportState {
        &self.state
    }

    /// Upload attempts recorded in the name
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.state.attempts()
    }

    /// Whether a user-facing local id refers to this report.
    ///
    /// Local ids match as a suffix of the base, so callers may use either
    /// the full base or its trailing segment.
    #[must_use]
    pub fn matches_local_id(&self, local_id: &str) -> bool {
        !local_id.is_empty() && self.base.ends_with(local_id)
    }

    /// The renamed value after a successful upload.
    ///
    /// Strips any attempt segment: `Uploaded` is terminal and attemptless.
    pub fn to_uploaded(&self) -> Result<Self, DomainError> {
        match self.state {
            ReportState::Pending { .. } | ReportState::Forced { .. } => Ok(Self {
                state: ReportState::Uploaded,
                ..self.clone()
            }),
            _ => Err(self.illegal("uploaded")),
        }
    }

    /// The renamed value after an upload was skipped.
    ///
    /// The attempt count is preserved so a later forced upload can report
    /// how many attempts preceded the skip.
    pub fn to_skipped(&self) -> Result<Self, DomainError> {
        match self.state {
            ReportState::Pending { attempts } | ReportState::Forced { attempts } => Ok(Self {
                state: ReportState::Skipped { attempts },
                ..self.clone()
            }),
            _ => Err(self.illegal("skipped")),
        }
    }

    /// The renamed value after a user forced this report past the retry
    /// gate. Resets the attempt count to 0; re-forcing an already-forced
    /// report is permitted and also resets the count.
    pub fn to_forced(&self) -> Result<Self, DomainError> {
        match self.state {
            ReportState::Pending { .. }
            | ReportState::Skipped { .. }
            | ReportState::Forced { .. } => Ok(Self {
                state: ReportState::Forced { attempts: 0 },
                ..self.clone()
            }),
            _ => Err(self.illegal("forced")),
        }
    }

    /// The renamed value after one more failed upload attempt.
    pub fn with_incremented_attempt(&self) -> Result<Self, DomainError> {
        let state = match self.state {
            ReportState::Pending { attempts } => ReportState::Pending {
                attempts: attempts + 1,
            },
            ReportState::Skipped { attempts } => ReportState::Skipped {
                attempts: attempts + 1,
            },
            ReportState::Forced { attempts } => ReportState::Forced {
                attempts: attempts + 1,
            },
            _ => return Err(self.illegal(self.state.label())),
        };
        Ok(Self {
            state,
            ..self.clone()
        })
    }

    fn illegal(&self, to: &'static str) -> DomainError {
        DomainError::IllegalTransition {
            from: self.state.label(),
            to,
        }
    }
}

impl Display for ReportName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> ReportName {
        ReportName::parse(name).unwrap_or_else(|| panic!("{name} should parse"))
    }

    #[test]
    fn test_parse_pending_with_owner() {
        let report = parse("5_a1b2c3d4.dmp");
        assert_eq!(report.owner(), Some(OwnerId::new(5)));
        assert_eq!(report.base(), "a1b2c3d4");
        assert_eq!(report.generation(), None);
        assert_eq!(*report.state(), ReportState::Pending { attempts: 0 });
    }

    #[test]
    fn test_parse_generation_and_attempts() {
        let report = parse("render_worker-111.dmp2.try1");
        // "render" is not all digits, so the name has no owner.
        assert_eq!(report.owner(), None);
        assert_eq!(report.base(), "render_worker-111");
        assert_eq!(report.generation(), Some(2));
        assert_eq!(report.attempts(), 1);
    }

    #[test]
    fn test_parse_attempt_count_matches_try_segment() {
        for attempts in [0u32, 1, 3, 17] {
            let report = parse(&format!("abc.dmp0.try{attempts}"));
            assert_eq!(report.attempts(), attempts);
        }
        assert_eq!(parse("abc.dmp0").attempts(), 0);
        assert_eq!(parse("abc.skipped.try2").attempts(), 2);
        assert_eq!(parse("abc.forced0").attempts(), 0);
    }

    #[test]
    fn test_parse_uploaded_discards_legacy_attempts() {
        let report = parse("abc.up0.try3");
        assert_eq!(*report.state(), ReportState::Uploaded);
        assert_eq!(report.attempts(), 0);
        assert_eq!(report.file_name(), "abc.up0");
    }

    #[test]
    fn test_parse_temporary() {
        let report = parse("spool-0a1b2c.tmp");
        assert_eq!(*report.state(), ReportState::Temporary);
        assert!(ReportName::parse("spool-0a1b2c.tmp.try1").is_none());
    }

    #[test]
    fn test_parse_rejects_non_reports() {
        assert!(ReportName::parse("uploads.log").is_none());
        assert!(ReportName::parse("no-marker").is_none());
        assert!(ReportName::parse(".dmp").is_none());
        assert!(ReportName::parse("a.dmp.nottry1").is_none());
        assert!(ReportName::parse("a.dmp.try").is_none());
        assert!(ReportName::parse("a.dmp.try1.extra").is_none());
        assert!(ReportName::parse("a.dmpx1").is_none());
    }

    #[test]
    fn test_file_name_round_trip() {
        for name in [
            "5_a1b2c3d4.dmp",
            "5_a1b2c3d4.dmp0",
            "a1b2c3d4.skipped2.try3",
            "10007_deadbeef.forced0",
            "deadbeef.up1",
            "spool-xyz.tmp",
        ] {
            assert_eq!(parse(name).file_name(), name);
        }
    }

    #[test]
    fn test_file_name_normalizes_try0() {
        assert_eq!(parse("abc.forced0.try0").file_name(), "abc.forced0");
    }

    #[test]
    fn test_fresh_report_parses_back() {
        let fresh = ReportName::fresh(OwnerId::new(42));
        let reparsed = parse(&fresh.file_name());
        assert_eq!(reparsed, fresh);
        assert_eq!(reparsed.owner(), Some(OwnerId::new(42)));
        assert_eq!(reparsed.attempts(), 0);
    }

    #[test]
    fn test_increment_is_monotonic() {
        let mut report = parse("abc.dmp0");
        for expected in 1..=5 {
            report = report.with_incremented_attempt().unwrap();
            assert_eq!(report.attempts(), expected);
        }
        assert_eq!(report.file_name(), "abc.dmp0.try5");
    }

    #[test]
    fn test_forced_resets_attempts() {
        let skipped = parse("abc.skipped0.try2");
        let forced = skipped.to_forced().unwrap();
        assert_eq!(*forced.state(), ReportState::Forced { attempts: 0 });
        assert_eq!(forced.file_name(), "abc.forced0");

        // Re-forcing a forced report resets its count again.
        let retried = forced.with_incremented_attempt().unwrap();
        assert_eq!(retried.to_forced().unwrap().attempts(), 0);
    }

    #[test]
    fn test_forcing_uploaded_is_rejected() {
        let uploaded = parse("abc.up0");
        let err = uploaded.to_forced().unwrap_err();
        assert_eq!(
            err,
            DomainError::IllegalTransition {
                from: "uploaded",
                to: "forced",
            }
        );
    }

    #[test]
    fn test_uploaded_strips_attempt_segment() {
        let pending = parse("abc.dmp0.try2");
        let uploaded = pending.to_uploaded().unwrap();
        assert_eq!(uploaded.file_name(), "abc.up0");
    }

    #[test]
    fn test_skipped_preserves_attempts() {
        let pending = parse("abc.dmp.try2");
        let skipped = pending.to_skipped().unwrap();
        assert_eq!(skipped.file_name(), "abc.skipped.try2");
        assert!(skipped.to_uploaded().is_err());
    }

    #[test]
    fn test_illegal_transitions() {
        let uploaded = parse("abc.up");
        assert!(uploaded.to_uploaded().is_err());
        assert!(uploaded.to_skipped().is_err());
        assert!(uploaded.with_incremented_attempt().is_err());

        let temporary = parse("abc.tmp");
        assert!(temporary.to_uploaded().is_err());
        assert!(temporary.to_forced().is_err());
    }

    #[test]
    fn test_matches_local_id() {
        let report = parse("5_app-renderer-crash-f297dbcba7a2d0bb.dmp0.try3");
        assert!(report.matches_local_id("f297dbcba7a2d0bb"));
        assert!(report.matches_local_id("app-renderer-crash-f297dbcba7a2d0bb"));
        assert!(!report.matches_local_id("0000000000000000"));
        assert!(!report.matches_local_id(""));
    }
}
