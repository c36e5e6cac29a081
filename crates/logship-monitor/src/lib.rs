//! logship-monitor — the `/monitor` HTTP endpoint.
//!
//! One read-only route. Each request asks the metrics aggregator for its
//! counters, reads the live depth of both pipeline queues, and answers with a
//! tab-indented JSON [`MetricsSnapshot`].

pub mod server;
pub mod snapshot;

pub use server::{bind, router, serve, MonitorError, MonitorState};
pub use snapshot::{format_uptime, MetricsSnapshot};
