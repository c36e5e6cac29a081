//! Configuration types for logship.
//!
//! [`Config::load`] layers the embedded defaults, an optional TOML file and
//! `LOGSHIP__SECTION__KEY` environment variables, in that order.
//! [`Config::defaults`] returns the built-in values without touching the
//! filesystem or the environment (useful in tests).

use crate::error::ConfigError;
use crate::parser::{FieldLayout, FieldOverrides, LayoutPreset};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[source]
path             = "testdata/access.log"
poll_interval_ms = 1000
from_start       = false

[pipeline]
tailers            = 2
sinks              = 4
queue_capacity     = 200
event_capacity     = 200
max_restarts       = 3
restart_backoff_ms = 1000

[parser]
layout           = "nginx_upstream"
timezone         = "Asia/Shanghai"
timestamp_format = "%d/%b/%Y:%H:%M:%S %z"
strict_numbers   = false

[sink]
url                = "http://localhost:8086"
database           = "mydb"
measurement        = "nginx_log"
precision          = "s"
batch_size         = 50
timeout_ms         = 5000
max_attempts       = 3
initial_backoff_ms = 200
max_backoff_ms     = 5000
spill_capacity     = 64

[monitor]
listen               = "0.0.0.0:8888"
sample_interval_secs = 5
window               = 2
"#;

const ENV_PREFIX: &str = "LOGSHIP";

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// `[source]` — the tailed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Read existing content before tailing instead of seeking to the end.
    #[serde(default)]
    pub from_start: bool,
}

fn default_source_path() -> PathBuf { PathBuf::from("testdata/access.log") }
fn default_poll_interval_ms() -> u64 { 1000 }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            poll_interval_ms: default_poll_interval_ms(),
            from_start: false,
        }
    }
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `[pipeline]` — task cardinality, queue sizing and the restart budget.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of tailer+parser pairs.
    #[serde(default = "default_tailers")]
    pub tailers: usize,
    /// Number of sink workers.
    #[serde(default = "default_sinks")]
    pub sinks: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Capacity of the metrics-event queue.
    #[serde(default = "default_queue_capacity")]
    pub event_capacity: usize,
    /// Restarts allowed per task before the pipeline is stopped.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_backoff_ms")]
    pub restart_backoff_ms: u64,
}

fn default_tailers() -> usize { 2 }
fn default_sinks() -> usize { 4 }
fn default_queue_capacity() -> usize { 200 }
fn default_max_restarts() -> u32 { 3 }
fn default_restart_backoff_ms() -> u64 { 1000 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tailers: default_tailers(),
            sinks: default_sinks(),
            queue_capacity: default_queue_capacity(),
            event_capacity: default_queue_capacity(),
            max_restarts: default_max_restarts(),
            restart_backoff_ms: default_restart_backoff_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }
}

/// `[parser]` — field layout and timestamp interpretation.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    #[serde(default)]
    pub layout: LayoutPreset,
    /// Per-field position overrides applied on top of the preset.
    #[serde(default)]
    pub fields: FieldOverrides,
    /// IANA zone name the log's wall-clock timestamps are interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// `chrono` format applied to `"<date> <zone>"`.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Reject lines with unparsable numbers instead of reading them as zero.
    #[serde(default)]
    pub strict_numbers: bool,
}

fn default_timezone() -> String { "Asia/Shanghai".to_string() }
fn default_timestamp_format() -> String { "%d/%b/%Y:%H:%M:%S %z".to_string() }

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            layout: LayoutPreset::default(),
            fields: FieldOverrides::default(),
            timezone: default_timezone(),
            timestamp_format: default_timestamp_format(),
            strict_numbers: false,
        }
    }
}

/// `[sink]` — InfluxDB writer and its retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    #[serde(default = "default_precision")]
    pub precision: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Failed batches kept for a later retry.
    #[serde(default = "default_spill_capacity")]
    pub spill_capacity: usize,
}

fn default_sink_url() -> String { "http://localhost:8086".to_string() }
fn default_database() -> String { "mydb".to_string() }
fn default_measurement() -> String { "nginx_log".to_string() }
fn default_precision() -> String { "s".to_string() }
fn default_batch_size() -> usize { 50 }
fn default_timeout_ms() -> u64 { 5000 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 200 }
fn default_max_backoff_ms() -> u64 { 5000 }
fn default_spill_capacity() -> usize { 64 }

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: default_sink_url(),
            database: default_database(),
            measurement: default_measurement(),
            precision: default_precision(),
            username: None,
            password: None,
            batch_size: default_batch_size(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            spill_capacity: default_spill_capacity(),
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[monitor]` — the `/monitor` endpoint and throughput sampling.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    /// Samples kept in the throughput window.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_listen() -> String { "0.0.0.0:8888".to_string() }
fn default_sample_interval_secs() -> u64 { 5 }
fn default_window() -> usize { 2 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            sample_interval_secs: default_sample_interval_secs(),
            window: default_window(),
        }
    }
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::ListenAddr(self.listen.clone()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load the built-in defaults, then `path` (which must exist when given),
    /// then `LOGSHIP__*` environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("source.poll_interval_ms", self.source.poll_interval_ms as usize),
            ("pipeline.tailers", self.pipeline.tailers),
            ("pipeline.sinks", self.pipeline.sinks),
            ("pipeline.queue_capacity", self.pipeline.queue_capacity),
            ("pipeline.event_capacity", self.pipeline.event_capacity),
            ("sink.batch_size", self.sink.batch_size),
            ("sink.max_attempts", self.sink.max_attempts as usize),
            ("monitor.sample_interval_secs", self.monitor.sample_interval_secs as usize),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(name));
        }
        if self.monitor.window < 2 {
            return Err(ConfigError::Window(self.monitor.window));
        }

        self.parser
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::TimeZone(self.parser.timezone.clone()))?;
        FieldLayout::preset(self.parser.layout)
            .with_overrides(&self.parser.fields)
            .validate()?;

        self.monitor.listen_addr()?;

        if !(self.sink.url.starts_with("http://") || self.sink.url.starts_with("https://")) {
            return Err(ConfigError::SinkUrl(self.sink.url.clone()));
        }
        if !matches!(self.sink.precision.as_str(), "n" | "u" | "ms" | "s" | "m" | "h") {
            return Err(ConfigError::Precision(self.sink.precision.clone()));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
