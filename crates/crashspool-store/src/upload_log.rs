//! Upload-event manifest
//!
//! Successful uploads are recorded in an append-only `uploads.log` file
//! inside the spool directory, one line per upload:
//!
//! ```text
//! {unix_seconds},{remote_id},{local_id}
//! ```
//!
//! The manifest is the durable link between a local report and the
//! identifier the receiving service assigned to it, and it outlives the
//! report files themselves: retention sweeps never touch it.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Reserved manifest file name within the spool directory.
///
/// Exempt from the naming grammar and from all retention sweeps.
pub const UPLOAD_LOG_FILENAME: &str = "uploads.log";

/// One recorded upload event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLogEntry {
    /// When the upload completed
    pub uploaded_at: DateTime<Utc>,
    /// Identifier assigned by the receiving service
    pub remote_id: String,
    /// Local id of the report that was uploaded
    pub local_id: String,
}

/// Append/read access to the upload manifest
#[derive(Debug, Clone)]
pub struct UploadLog {
    path: PathBuf,
}

impl UploadLog {
    /// Creates a log handle for the manifest at `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the manifest path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one upload event.
    pub fn append(&self, local_id: &str, remote_id: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{},{},{}", Utc::now().timestamp(), remote_id, local_id)
    }

    /// Read all recorded events, oldest first.
    ///
    /// A missing manifest reads as empty. Malformed lines are skipped.
    pub fn entries(&self) -> io::Result<Vec<UploadLogEntry>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(contents.lines().filter_map(parse_line).collect())
    }

    /// The most recent event for `local_id`, if the report was ever
    /// successfully uploaded.
    pub fn find(&self, local_id: &str) -> io::Result<Option<UploadLogEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .find(|entry| entry.local_id == local_id))
    }
}

fn parse_line(line: &str) -> Option<UploadLogEntry> {
    let mut fields = line.splitn(3, ',');
    let timestamp: i64 = fields.next()?.trim().parse().ok()?;
    let remote_id = fields.next()?.trim();
    let local_id = fields.next()?.trim();
    if remote_id.is_empty() || local_id.is_empty() {
        return None;
    }
    Some(UploadLogEntry {
        uploaded_at: DateTime::from_timestamp(timestamp, 0)?,
        remote_id: remote_id.to_string(),
        local_id: local_id.to_string(),
    })
}
