//! LineSource — polling tail of a single growing file.
//!
//! The file is opened once and, unless `from_start` is set, read from its
//! current end. Complete lines are pushed onto the raw-line queue with the
//! newline stripped. At end-of-file the task sleeps for the poll interval and
//! tries again; a partially written line stays in the buffer until its
//! newline arrives.
//!
//! Each instance keeps its own cursor. Running several against one file
//! delivers every line once per instance.

use bytes::Bytes;
use logship_core::config::SourceConfig;
use logship_core::metrics::MetricsHandle;
use logship_core::queue::QueueSender;
use logship_core::RawLine;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("raw-line queue closed")]
    QueueClosed,

    #[error("metrics aggregator stopped")]
    MetricsClosed,
}

#[derive(Debug, Clone)]
pub struct LineSource {
    path: PathBuf,
    poll_interval: Duration,
    from_start: bool,
}

impl LineSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            path: config.path.clone(),
            poll_interval: config.poll_interval(),
            from_start: config.from_start,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tail until `cancel` fires. Only I/O failures and closed queues end the
    /// task early.
    pub async fn run(
        &self,
        out: QueueSender<RawLine>,
        metrics: MetricsHandle,
        cancel: CancellationToken,
    ) -> Result<(), TailError> {
        let mut file = File::open(&self.path).await.map_err(|source| TailError::Open {
            path: self.path.clone(),
            source,
        })?;
        if !self.from_start {
            file.seek(SeekFrom::End(0))
                .await
                .map_err(|source| self.read_error(source))?;
        }

        info!(path = %self.path.display(), from_start = self.from_start, "starting tailer");

        let mut reader = BufReader::new(file);
        let mut buf = Vec::with_capacity(512);

        while !cancel.is_cancelled() {
            reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| self.read_error(source))?;

            if buf.last() != Some(&b'\n') {
                // EOF, possibly with a partial line held in `buf`.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
                continue;
            }

            let line = take_line(&mut buf);
            metrics
                .handled_line()
                .await
                .map_err(|_| TailError::MetricsClosed)?;
            out.push(line).await.map_err(|_| TailError::QueueClosed)?;
        }

        debug!(path = %self.path.display(), pending = buf.len(), "tailer stopped");
        Ok(())
    }

    fn read_error(&self, source: std::io::Error) -> TailError {
        TailError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

/// Move a complete line out of `buf`, dropping `\n` and a preceding `\r`.
fn take_line(buf: &mut Vec<u8>) -> RawLine {
    let mut line = std::mem::take(buf);
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Bytes::from(line)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
