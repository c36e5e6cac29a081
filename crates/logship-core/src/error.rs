//! Error types shared across the pipeline.
//!
//! Malformed input ([`ParseError`]) is counted and skipped by the parser
//! stage. Everything else is infrastructure and ends the task that hit it.

use crate::parser::LayoutError;
use thiserror::Error;

/// A raw line could not be turned into a [`LogRecord`](crate::LogRecord).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The line has fewer delimited fields than the layout needs.
    #[error("schema mismatch: layout needs {needed} fields, line has {found}")]
    SchemaMismatch { needed: usize, found: usize },

    #[error("invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },

    /// The timestamp is ambiguous or skipped in the source zone (DST edges).
    #[error("timestamp {value:?} does not map to a single instant in {zone}")]
    LocalTime { value: String, zone: String },

    /// Only raised when strict numeric parsing is enabled.
    #[error("field {field} is not a valid number: {value:?}")]
    Number { field: &'static str, value: String },
}

/// Invalid configuration detected by [`Config::validate`](crate::config::Config::validate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("monitor.window must hold at least two samples, got {0}")]
    Window(usize),

    #[error("unknown time zone {0:?}")]
    TimeZone(String),

    #[error("invalid listen address {0:?}")]
    ListenAddr(String),

    #[error("invalid sink url {0:?}")]
    SinkUrl(String),

    #[error("sink precision must be one of n, u, ms, s, m, h; got {0:?}")]
    Precision(String),

    #[error("invalid field layout: {0}")]
    Layout(#[from] LayoutError),
}

/// The other end of a queue has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue closed")]
pub struct QueueClosed;
