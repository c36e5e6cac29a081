use crate::snapshot::{format_uptime, MetricsSnapshot};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use logship_core::metrics::{MetricsError, MetricsHandle};
use logship_core::queue::QueueProbe;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to bind monitor on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("monitor server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Everything a `/monitor` request reads. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MonitorState {
    metrics: MetricsHandle,
    raw: QueueProbe,
    records: QueueProbe,
    started: Instant,
}

impl MonitorState {
    /// `raw` and `records` gauge the raw-line and record queues. Uptime is
    /// measured from this call.
    pub fn new(metrics: MetricsHandle, raw: QueueProbe, records: QueueProbe) -> Self {
        Self {
            metrics,
            raw,
            records,
            started: Instant::now(),
        }
    }

    pub async fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError> {
        let counters = self.metrics.counters().await?;
        Ok(MetricsSnapshot {
            handle_line: counters.handled_lines,
            tps: counters.tps,
            read_chan_len: self.raw.depth(),
            write_chan_len: self.records.depth(),
            run_time: format_uptime(self.started.elapsed()),
            err_num: counters.errors,
        })
    }
}

pub fn router(state: MonitorState) -> Router {
    Router::new()
        .route("/monitor", get(monitor))
        .with_state(state)
}

async fn monitor(State(state): State<MonitorState>) -> Response {
    let snapshot = match state.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(error = %e, "monitor request without aggregator");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    match snapshot.to_json() {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode snapshot");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, MonitorError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| MonitorError::Bind { addr, source })
}

/// Serve `/monitor` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: MonitorState,
    cancel: CancellationToken,
) -> Result<(), MonitorError> {
    let addr = listener.local_addr()?;
    info!(%addr, "monitor listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    debug!(%addr, "monitor stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
