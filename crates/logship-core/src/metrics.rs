//! MetricsAggregator — single-writer owner of the pipeline counters.
//!
//! Tailers and parsers never touch a counter. They send [`MetricsEvent`]s
//! through a [`MetricsHandle`]; one task runs [`MetricsAggregator::run`] and
//! applies them in order. Throughput sampling and snapshot reads go through
//! the same queue, so the counters need no lock and no atomics.

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A discrete counter event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsEvent {
    /// A line was read from the source file.
    HandledLine,
    /// A line was counted as malformed and skipped.
    ErrorOccurred,
}

#[derive(Debug)]
enum AggregatorCommand {
    Event(MetricsEvent),
    Sample,
    Counters(oneshot::Sender<Counters>),
    Shutdown,
}

/// Point-in-time copy of the aggregated counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Counters {
    pub handled_lines: u64,
    pub errors: u64,
    /// Lines per second over the sampling window; zero until it is full.
    pub tps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("metrics aggregator has stopped")]
    Closed,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable sending side of the aggregator.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    tx: mpsc::Sender<AggregatorCommand>,
}

impl MetricsHandle {
    /// Queue an event, waiting if the event queue is full.
    pub async fn record(&self, event: MetricsEvent) -> Result<(), MetricsError> {
        self.send(AggregatorCommand::Event(event)).await
    }

    pub async fn handled_line(&self) -> Result<(), MetricsError> {
        self.record(MetricsEvent::HandledLine).await
    }

    pub async fn error(&self) -> Result<(), MetricsError> {
        self.record(MetricsEvent::ErrorOccurred).await
    }

    /// Append the current handled-line count to the throughput window.
    pub async fn sample(&self) -> Result<(), MetricsError> {
        self.send(AggregatorCommand::Sample).await
    }

    /// Read the counters. Answered after every event queued before it.
    pub async fn counters(&self) -> Result<Counters, MetricsError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(AggregatorCommand::Counters(response_tx)).await?;
        response_rx.await.map_err(|_| MetricsError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), MetricsError> {
        self.send(AggregatorCommand::Shutdown).await
    }

    async fn send(&self, command: AggregatorCommand) -> Result<(), MetricsError> {
        self.tx.send(command).await.map_err(|_| MetricsError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Throughput window
// ---------------------------------------------------------------------------

/// Sliding window of cumulative counts taken one sampling interval apart.
#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    samples: VecDeque<u64>,
    capacity: usize,
    interval: Duration,
}

impl ThroughputWindow {
    /// `capacity` is clamped to at least two samples.
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
            interval,
        }
    }

    pub fn push(&mut self, count: u64) {
        self.samples.push_back(count);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(newest - oldest) / span`, or zero with fewer than two samples.
    pub fn tps(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(oldest), Some(newest)) if self.samples.len() >= 2 => {
                let span = self.interval.as_secs_f64() * (self.samples.len() - 1) as f64;
                newest.saturating_sub(*oldest) as f64 / span
            }
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator service
// ---------------------------------------------------------------------------

pub struct MetricsAggregator {
    handled_lines: u64,
    errors: u64,
    window: ThroughputWindow,
    rx: mpsc::Receiver<AggregatorCommand>,
}

impl MetricsAggregator {
    /// Build the service and its handle. `event_capacity` bounds the event
    /// queue; `window` and `interval` shape the throughput estimate.
    pub fn new(event_capacity: usize, window: usize, interval: Duration) -> (Self, MetricsHandle) {
        let (tx, rx) = mpsc::channel(event_capacity);
        let service = Self {
            handled_lines: 0,
            errors: 0,
            window: ThroughputWindow::new(window, interval),
            rx,
        };
        (service, MetricsHandle { tx })
    }

    /// Apply commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        debug!("metrics aggregator started");

        while let Some(command) = self.rx.recv().await {
            match command {
                AggregatorCommand::Event(MetricsEvent::HandledLine) => self.handled_lines += 1,
                AggregatorCommand::Event(MetricsEvent::ErrorOccurred) => self.errors += 1,
                AggregatorCommand::Sample => self.window.push(self.handled_lines),
                AggregatorCommand::Counters(response_tx) => {
                    let counters = Counters {
                        handled_lines: self.handled_lines,
                        errors: self.errors,
                        tps: self.window.tps(),
                    };
                    if response_tx.send(counters).is_err() {
                        error!("failed to send counters - receiver dropped");
                    }
                }
                AggregatorCommand::Shutdown => {
                    debug!("metrics aggregator shutting down");
                    break;
                }
            }
        }

        debug!(
            handled_lines = self.handled_lines,
            errors = self.errors,
            "metrics aggregator stopped"
        );
    }
}

/// Ask the aggregator for a throughput sample every `interval`, starting one
/// interval from now, until `cancel` fires or the aggregator stops.
pub fn spawn_sampler(
    handle: MetricsHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if handle.sample().await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("throughput sampler stopped");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
