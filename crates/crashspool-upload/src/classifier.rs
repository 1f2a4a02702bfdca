//! Crash report classification
//!
//! Crash artifacts arrive as MIME-multipart payloads whose form fields
//! include a `ptype` part naming the crashed process type. The classifier
//! scans a bounded prefix of the payload for that part and maps its value
//! to a coarse [`CrashType`]. The result feeds telemetry only; it never
//! affects upload eligibility.

use crashspool_core::domain::CrashType;

/// Only this many leading bytes of a report are inspected. The `ptype`
/// field sits near the front of well-formed payloads.
const CLASSIFY_PREFIX_BYTES: usize = 4096;

/// The form-field marker preceding the process-type value
const PROCESS_TYPE_FIELD: &str = "name=\"ptype\"";

/// Classify a report payload by its embedded process-type field.
///
/// Unrecognized values, missing markers, truncated payloads and non-UTF-8
/// prefixes all map to [`CrashType::Other`].
#[must_use]
pub fn classify(payload: &[u8]) -> CrashType {
    let prefix = &payload[..payload.len().min(CLASSIFY_PREFIX_BYTES)];
    let text = String::from_utf8_lossy(prefix);

    let mut lines = text.lines();
    for line in lines.by_ref() {
        if line.contains(PROCESS_TYPE_FIELD) {
            break;
        }
    }
    // The field header is followed by a blank separator line, then the value.
    let value = lines.find(|line| !line.trim().is_empty());

    match value.map(str::trim) {
        Some("browser") => CrashType::Browser,
        Some("renderer") => CrashType::Renderer,
        Some("gpu-process") => CrashType::Gpu,
        _ => CrashType::Other,
    }
}
