//! InfluxDB 1.x writer.
//!
//! Each record becomes one line-protocol point:
//!
//! ```text
//! nginx_log,Path=/api/test,Method=GET,Schema=http,Status=200 UpstreamTime=0.012,RequestTime=0.02,BytesSent=1024i 1699595736
//! ```
//!
//! Points are stamped with the wall-clock time of submission, not with the
//! record's own timestamp.

use super::{RecordSink, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logship_core::config::SinkConfig;
use logship_core::LogRecord;
use reqwest::StatusCode;
use std::fmt::Write as _;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    database: String,
    measurement: String,
    precision: String,
    credentials: Option<(String, Option<String>)>,
}

impl InfluxSink {
    /// Build the writer. The HTTP client (and its connection pool) is shared
    /// by every clone.
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SinkError::Client(e.to_string()))?;

        Ok(Self {
            client,
            write_url: format!("{}/write", config.url.trim_end_matches('/')),
            database: config.database.clone(),
            measurement: config.measurement.clone(),
            precision: config.precision.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    /// Render a batch as a line-protocol body, one point per line.
    pub fn render(&self, batch: &[LogRecord], now: DateTime<Utc>) -> String {
        let stamp = timestamp(now, &self.precision);
        let measurement = escape(&self.measurement, &[',', ' ']);
        let mut body = String::with_capacity(batch.len() * 128);

        for record in batch {
            body.push_str(&measurement);
            let tags = [
                ("Path", record.path.as_str()),
                ("Method", record.method.as_str()),
                ("Schema", record.scheme.as_str()),
                ("Status", record.status.as_str()),
            ];
            // Empty tag values are invalid in line protocol.
            for (key, value) in tags.iter().filter(|(_, v)| !v.is_empty()) {
                let _ = write!(body, ",{key}={}", escape(value, &[',', '=', ' ']));
            }
            let _ = writeln!(
                body,
                " UpstreamTime={},RequestTime={},BytesSent={}i {stamp}",
                finite(record.upstream_time),
                finite(record.request_time),
                integer(record.bytes_sent),
            );
        }

        body
    }
}

#[async_trait]
impl RecordSink for InfluxSink {
    async fn accept(&self, batch: &[LogRecord]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = self.render(batch, Utc::now());

        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[("db", &self.database), ("precision", &self.precision)])
            .body(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(points = batch.len(), "batch written");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(SinkError::Unavailable {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Backslash-escape `special`. A backslash that would otherwise pair with the
/// next escape or with the separator after the value is doubled.
fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        let dangling = c == '\\' && chars.peek().map_or(true, |next| special.contains(next));
        if dangling || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Integer fields are signed 64-bit.
fn integer(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Line protocol has no NaN or infinity.
fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn timestamp(now: DateTime<Utc>, precision: &str) -> i64 {
    match precision {
        "n" => now.timestamp_nanos_opt().unwrap_or(i64::MAX),
        "u" => now.timestamp_micros(),
        "ms" => now.timestamp_millis(),
        "m" => now.timestamp() / 60,
        "h" => now.timestamp() / 3600,
        _ => now.timestamp(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
