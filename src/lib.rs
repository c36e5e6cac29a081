//! logship — tail an access log, parse each line, and ship the records to
//! InfluxDB while serving live counters on `GET /monitor`.
//!
//! The stages live in the member crates; this crate wires them together.
//!
//! # Architecture
//!
//! ```text
//! LineSource ──► raw queue ──► run_parser ──► record queue ──► SinkWorker ──► InfluxDB
//!     │                            │
//!     └──────── MetricsEvent ──────┴──► MetricsAggregator ◄── /monitor
//! ```
//!
//! Every tailer and parser runs under [`supervise`], which restarts it on
//! failure and stops the pipeline once the restart budget is spent.

pub mod pipeline;
pub mod supervisor;

pub use pipeline::{run_parser, Pipeline, PipelineError};
pub use supervisor::{supervise, RestartPolicy};
