//! logship-feeds — the two ends of the pipeline.
//!
//! [`tailer::LineSource`] polls a growing file and pushes raw lines onto the
//! raw-line queue. [`sink::SinkWorker`] drains the record queue in batches and
//! hands them to a [`sink::RecordSink`], retrying and spilling on failure.

pub mod sink;
pub mod tailer;

pub use sink::{InfluxSink, RecordSink, RetryPolicy, SinkError, SinkWorker};
pub use tailer::{LineSource, TailError};
