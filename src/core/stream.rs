//! Streaming and run-reporting types for playlist-dl
//!
//! Provides the body reader for HTTP responses, transfer tuning, and the
//! events a run reports to its orchestrator.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use tokio::io::AsyncRead;

/// Reader over an HTTP response body
pub fn create_http_stream(response: reqwest::Response) -> Box<dyn AsyncRead + Send + Unpin> {
    Box::new(tokio_util::io::StreamReader::new(
        response.bytes_stream().map_err(std::io::Error::other),
    ))
}

/// Byte progress callback `(downloaded, total)`; total is 0 when unknown
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Tuning for whole-transfer retries and streaming
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPolicy {
    /// Attempts of the full lookup-then-stream sequence
    pub attempts: u32,
    /// Pause between two attempts
    pub retry_delay: Duration,
    /// Read size while streaming
    pub chunk_size: usize,
    /// Longest wait for response headers, and for each read of the body
    pub stall_timeout: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_secs(3),
            chunk_size: 8 * 1024,
            stall_timeout: Duration::from_secs(30),
        }
    }
}

/// Notification sent to whoever drives a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// About to process item `index` (1-based) of `total`
    Progress {
        index: usize,
        total: usize,
        label: String,
    },
    /// Item `index` finished
    ItemOutcome {
        index: usize,
        success: bool,
        detail: String,
    },
    /// Run finished, possibly early through cancellation
    RunComplete {
        success: usize,
        failed: usize,
        skipped: usize,
    },
    /// Run aborted before any item work
    RunError(String),
}

/// Receiver for [`RunEvent`]s, called in item order
pub type EventCallback = Arc<dyn Fn(RunEvent) + Send + Sync>;

pub(crate) fn emit(events: Option<&EventCallback>, event: RunEvent) {
    if let Some(callback) = events {
        callback(event);
    }
}
