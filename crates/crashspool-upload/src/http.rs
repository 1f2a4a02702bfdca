//! HTTP uploader adapter
//!
//! Implements the [`IUploader`] port against an HTTP crash collector. The
//! report payload is POSTed verbatim; the collector answers a successful
//! upload with the assigned report id as its response body.
//!
//! The client carries its own request timeout. A timed-out or otherwise
//! failed transport surfaces as [`UploadOutcome::Retryable`]; re-attempting
//! is safe because the receiving service deduplicates by report identity.

use std::time::Duration;

use crashspool_core::domain::CrashType;
use crashspool_core::ports::{IUploader, UploadOutcome};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

/// Header carrying the classifier's process-type tag
const PROCESS_TYPE_HEADER: &str = "x-crash-process-type";

/// `reqwest`-backed implementation of the uploader port
pub struct HttpUploader {
    client: Client,
    url: String,
}

impl HttpUploader {
    /// Creates an uploader posting to `url` with the given per-request
    /// timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl IUploader for HttpUploader {
    async fn attempt(&self, payload: &[u8], crash_type: CrashType) -> UploadOutcome {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(PROCESS_TYPE_HEADER, crash_type.label())
            .body(payload.to_vec())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            // Timeouts surface here as transport errors.
            Err(e) => {
                return UploadOutcome::Retryable {
                    reason: e.to_string(),
                }
            }
        };

        let status = response.status();
        debug!(status = %status, "Collector responded");

        if status.is_success() {
            return match response.text().await {
                Ok(body) => {
                    let remote_id = body.trim().to_string();
                    if remote_id.is_empty() {
                        // The receiver deduplicates by report identity, so
                        // retrying to obtain an id is safe.
                        UploadOutcome::Retryable {
                            reason: "collector returned no upload id".to_string(),
                        }
                    } else {
                        UploadOutcome::Success { remote_id }
                    }
                }
                Err(e) => UploadOutcome::Retryable {
                    reason: e.to_string(),
                },
            };
        }

        if status.is_client_error() {
            UploadOutcome::Terminal {
                reason: format!("collector rejected upload: HTTP {status}"),
            }
        } else {
            UploadOutcome::Retryable {
                reason: format!("HTTP {status}"),
            }
        }
    }
}
