//! Record sinks.
//!
//! A [`RecordSink`] accepts a batch of records and either stores all of them
//! or reports why it could not. [`SinkWorker`] owns the policy around that
//! call: batching off the record queue, retrying transient failures, and
//! spilling batches that still fail into a bounded local buffer.

mod influx;
mod worker;

pub use influx::InfluxSink;
pub use worker::SinkWorker;

use async_trait::async_trait;
use logship_core::config::SinkConfig;
use logship_core::LogRecord;
use std::time::Duration;
use thiserror::Error;

/// The "accept a batch of records" capability.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn accept(&self, batch: &[LogRecord]) -> Result<(), SinkError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// The backend refused the batch; sending it again will not help.
    #[error("backend rejected batch ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The backend answered but is not accepting writes right now.
    #[error("backend unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to build sink client: {0}")]
    Client(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Rejected { .. } | SinkError::Client(_) => false,
            SinkError::Unavailable { .. } | SinkError::Transport(_) => true,
        }
    }
}

/// Exponential backoff between submission attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SinkConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
