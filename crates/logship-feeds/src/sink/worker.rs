use super::{RecordSink, RetryPolicy, SinkError};
use logship_core::config::SinkConfig;
use logship_core::queue::QueueReceiver;
use logship_core::LogRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Drains the record queue into a [`RecordSink`].
///
/// Several workers can share one queue and one sink. A worker never fails:
/// a batch is either delivered, dropped after a permanent rejection, or kept
/// in the spill buffer and offered again before the next batch. A rejected
/// batch is resent in halves, so only the records the backend refuses are
/// lost.
pub struct SinkWorker {
    id: usize,
    sink: Arc<dyn RecordSink>,
    policy: RetryPolicy,
    batch_size: usize,
    spill: VecDeque<Vec<LogRecord>>,
    spill_capacity: usize,
}

impl SinkWorker {
    pub fn new(id: usize, sink: Arc<dyn RecordSink>, config: &SinkConfig) -> Self {
        Self {
            id,
            sink,
            policy: RetryPolicy::from_config(config),
            batch_size: config.batch_size.max(1),
            spill: VecDeque::new(),
            spill_capacity: config.spill_capacity,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Batches currently waiting in the spill buffer.
    pub fn spilled(&self) -> usize {
        self.spill.len()
    }

    /// Run until the record queue is closed and drained.
    pub async fn run(mut self, input: QueueReceiver<LogRecord>) {
        debug!(worker = self.id, "sink worker started");

        while let Some(batch) = input.pop_batch(self.batch_size).await {
            self.retry_spilled().await;
            self.deliver(batch).await;
        }

        self.retry_spilled().await;
        if !self.spill.is_empty() {
            let records: usize = self.spill.iter().map(Vec::len).sum();
            error!(
                worker = self.id,
                batches = self.spill.len(),
                records,
                "dropping spilled batches on shutdown"
            );
        }
        debug!(worker = self.id, "sink worker stopped");
    }

    /// Submit one batch with retries; spill it if every attempt fails.
    pub async fn deliver(&mut self, batch: Vec<LogRecord>) {
        let mut pending = vec![batch];
        while let Some(batch) = pending.pop() {
            match self.submit(&batch).await {
                Ok(()) => {}
                Err(e) if !e.is_retryable() && batch.len() > 1 => {
                    warn!(worker = self.id, records = batch.len(), error = %e, "batch rejected; resending in halves");
                    let (first, second) = halve(batch);
                    pending.push(second);
                    pending.push(first);
                }
                Err(e) if !e.is_retryable() => {
                    error!(worker = self.id, records = batch.len(), error = %e, "batch dropped");
                }
                Err(e) => {
                    error!(
                        worker = self.id,
                        records = batch.len(),
                        attempts = self.policy.max_attempts,
                        error = %e,
                        "sink degraded; spilling batch"
                    );
                    self.spill_batch(batch);
                }
            }
        }
    }

    async fn submit(&self, batch: &[LogRecord]) -> Result<(), SinkError> {
        let mut attempt = 1;
        loop {
            match self.sink.accept(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        worker = self.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "sink write failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn spill_batch(&mut self, batch: Vec<LogRecord>) {
        if self.spill_capacity == 0 {
            error!(worker = self.id, records = batch.len(), "spill disabled; batch dropped");
            return;
        }
        if self.spill.len() >= self.spill_capacity {
            if let Some(oldest) = self.spill.pop_front() {
                error!(
                    worker = self.id,
                    records = oldest.len(),
                    "spill buffer full; dropping oldest batch"
                );
            }
        }
        self.spill.push_back(batch);
    }

    /// Offer spilled batches once each, oldest first, stopping at the first
    /// transient failure.
    async fn retry_spilled(&mut self) {
        while let Some(batch) = self.spill.front() {
            match self.sink.accept(batch).await {
                Ok(()) => {
                    debug!(worker = self.id, records = batch.len(), "spilled batch delivered");
                    self.spill.pop_front();
                }
                Err(e) if !e.is_retryable() => {
                    let records = batch.len();
                    let Some(batch) = self.spill.pop_front() else { break };
                    if records > 1 {
                        warn!(worker = self.id, records, error = %e, "spilled batch rejected; resending in halves");
                        let (first, second) = halve(batch);
                        self.spill.push_front(second);
                        self.spill.push_front(first);
                    } else {
                        error!(worker = self.id, records, error = %e, "spilled batch dropped");
                    }
                }
                Err(_) => break,
            }
        }
    }
}

fn halve(mut batch: Vec<LogRecord>) -> (Vec<LogRecord>, Vec<LogRecord>) {
    let second = batch.split_off(batch.len() / 2);
    (batch, second)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
