//! Test builders — ergonomic constructors for configs and records.
//!
//! These builders are designed for readability in test assertions, not for
//! production use. They panic on invalid input rather than returning `Result`.

use chrono::TimeZone;
use logship_core::config::Config;
use logship_core::parser::LayoutPreset;
use logship_core::LogRecord;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for a pipeline [`Config`] tuned for fast tests: one tailer,
/// 10ms polling, `combined_timing` layout, quick retries.
///
/// # Example
///
/// ```rust
/// let config = ConfigBuilder::new(log.path())
///     .sink_url(&influx.base_url())
///     .sinks(2)
///     .build();
/// ```
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(source: &Path) -> Self {
        let mut config = Config::defaults();
        config.source.path = source.to_path_buf();
        config.source.poll_interval_ms = 10;
        config.pipeline.tailers = 1;
        config.pipeline.sinks = 1;
        config.pipeline.queue_capacity = 16;
        config.pipeline.restart_backoff_ms = 10;
        config.parser.layout = LayoutPreset::CombinedTiming;
        config.sink.batch_size = 4;
        config.sink.initial_backoff_ms = 10;
        config.sink.max_backoff_ms = 50;
        config.monitor.listen = "127.0.0.1:0".to_string();
        config.monitor.sample_interval_secs = 1;
        Self { config }
    }

    pub fn tailers(mut self, n: usize) -> Self {
        self.config.pipeline.tailers = n;
        self
    }

    pub fn sinks(mut self, n: usize) -> Self {
        self.config.pipeline.sinks = n;
        self
    }

    pub fn from_start(mut self, from_start: bool) -> Self {
        self.config.source.from_start = from_start;
        self
    }

    pub fn sink_url(mut self, url: &str) -> Self {
        self.config.sink.url = url.to_string();
        self
    }

    pub fn max_restarts(mut self, n: u32) -> Self {
        self.config.pipeline.max_restarts = n;
        self
    }

    pub fn layout(mut self, layout: LayoutPreset) -> Self {
        self.config.parser.layout = layout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// ---------------------------------------------------------------------------
// LogRecordBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`LogRecord`] fixtures. Defaults to a `GET /` answered
/// with `200`, stamped 2024-01-01T00:00:00 UTC.
pub struct LogRecordBuilder {
    record: LogRecord,
}

impl LogRecordBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            record: LogRecord {
                timestamp: chrono_tz::UTC
                    .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                    .unwrap(),
                bytes_sent: 0,
                path: path.into(),
                method: "GET".to_string(),
                scheme: "HTTP/1.1".to_string(),
                status: "200".to_string(),
                upstream_time: 0.0,
                request_time: 0.0,
            },
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.record.method = method.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.record.status = status.to_string();
        self
    }

    pub fn bytes_sent(mut self, bytes: u64) -> Self {
        self.record.bytes_sent = bytes;
        self
    }

    pub fn timings(mut self, upstream: f64, request: f64) -> Self {
        self.record.upstream_time = upstream;
        self.record.request_time = request;
        self
    }

    pub fn build(self) -> LogRecord {
        self.record
    }
}

/// `n` records with paths `/r/0` onwards.
pub fn records(n: usize) -> Vec<LogRecord> {
    (0..n)
        .map(|i| LogRecordBuilder::new(format!("/r/{i}")).bytes_sent(i as u64).build())
        .collect()
}

/// An empty log file that lives as long as the returned handle.
pub fn empty_log() -> tempfile::NamedTempFile {
    tempfile::Builder::new()
        .suffix(".log")
        .tempfile()
        .expect("create temp log")
}
