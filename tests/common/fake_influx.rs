//! FakeInflux — an in-process InfluxDB 1.x write endpoint.
//!
//! Spins up a minimal `axum` HTTP server on a random TCP port bound to
//! 127.0.0.1 that accepts `POST /write` and records every line-protocol point
//! it receives. Responses can be scripted to exercise retry and rejection
//! paths.
//!
//! # Usage
//!
//! ```rust
//! let influx = FakeInflux::start().await.unwrap();
//! influx.respond_with([503, 503]).await; // two failures, then 204s
//! let config = ConfigBuilder::new(log.path()).sink_url(&influx.base_url()).build();
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Router,
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Default)]
struct WriteState {
    /// Statuses to answer with before falling back to 204.
    script: VecDeque<u16>,
    /// Points from accepted writes, in arrival order.
    points: Vec<String>,
    /// Every request seen, accepted or not.
    requests: usize,
    last_query: HashMap<String, String>,
}

/// Handle to the running fake InfluxDB server.
pub struct FakeInflux {
    addr: SocketAddr,
    state: Arc<Mutex<WriteState>>,
}

impl FakeInflux {
    /// Start the server on a random port. Returns once it is listening.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(WriteState::default()));

        let app = Router::new()
            .route("/write", post(write))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, state })
    }

    /// Base URL for the API (e.g. `http://127.0.0.1:PORT`).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer the next requests with these statuses, then 204 again.
    pub async fn respond_with(&self, statuses: impl IntoIterator<Item = u16>) {
        self.state.lock().await.script.extend(statuses);
    }

    /// Accepted points so far.
    pub async fn points(&self) -> Vec<String> {
        self.state.lock().await.points.clone()
    }

    pub async fn requests(&self) -> usize {
        self.state.lock().await.requests
    }

    /// Query string of the most recent request.
    pub async fn last_query(&self) -> HashMap<String, String> {
        self.state.lock().await.last_query.clone()
    }
}

async fn write(
    State(state): State<Arc<Mutex<WriteState>>>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> StatusCode {
    let mut state = state.lock().await;
    state.requests += 1;
    state.last_query = query;

    let status = state.script.pop_front().unwrap_or(204);
    if status == 204 {
        state
            .points
            .extend(body.lines().filter(|l| !l.is_empty()).map(str::to_string));
    }
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
