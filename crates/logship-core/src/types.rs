//! Core types for logship-core.
//!
//! This module defines the two units of work that move through the pipeline:
//! the [`RawLine`] produced by the tailer and the [`LogRecord`] produced by the
//! parser.

use chrono::DateTime;
use chrono_tz::Tz;

/// One log line with its trailing newline stripped.
///
/// `Bytes` is cheap to move between tasks and never copied on dequeue.
pub type RawLine = bytes::Bytes;

/// A parsed access-log entry, ready to be shipped to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Local time of the request, interpreted in the configured source zone.
    pub timestamp: DateTime<Tz>,
    /// Response body size in bytes.
    pub bytes_sent: u64,
    /// Request path, verbatim.
    pub path: String,
    /// HTTP method, verbatim.
    pub method: String,
    /// Scheme (or protocol, depending on the layout), verbatim.
    pub scheme: String,
    /// HTTP status code as text, verbatim.
    pub status: String,
    /// Upstream response time in seconds.
    pub upstream_time: f64,
    /// Total request time in seconds.
    pub request_time: f64,
}
