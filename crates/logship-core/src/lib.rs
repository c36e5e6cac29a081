//! logship-core — core library for the logship pipeline.
//!
//! This crate holds everything the pipeline stages share: the record types,
//! the configuration layer, the bounded queues that connect the stages, the
//! line parser, and the single-writer metrics aggregator.
//!
//! # Architecture
//!
//! ```text
//! file ──► LineSource ──► [raw queue] ──► RecordParser ──► [record queue] ──► RecordSink
//!              │                               │
//!              └────────── MetricsEvent ───────┴──► MetricsAggregator ◄── /monitor
//! ```
//!
//! All inter-stage communication uses `tokio` channels. Counters are owned by
//! the aggregator task alone; every other task only sends events to it.

pub mod config;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod queue;
pub mod types;

pub use error::{ConfigError, ParseError, QueueClosed};
pub use types::{LogRecord, RawLine};
