//! Pipeline — wires the stages together and owns their lifetimes.
//!
//! ```text
//! LineSource ×N ──► raw queue ──► parser ×N ──► record queue ──► SinkWorker ×M
//! ```
//!
//! Shutdown runs front to back. Cancelling stops the tailers; each parser
//! exits once the raw queue is closed and drained; each sink worker exits once
//! the record queue is. Only then are the sampler, the monitor server and the
//! aggregator stopped.

use crate::supervisor::{supervise, RestartPolicy};
use logship_core::config::Config;
use logship_core::metrics::{spawn_sampler, MetricsAggregator, MetricsHandle};
use logship_core::parser::{ParserSetupError, RecordParser};
use logship_core::queue::{bounded, QueueReceiver, QueueSender};
use logship_core::{ConfigError, LogRecord, RawLine};
use logship_feeds::{InfluxSink, LineSource, RecordSink, SinkError, SinkWorker};
use logship_monitor::{MonitorError, MonitorState};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid parser setup: {0}")]
    Parser(#[from] ParserSetupError),

    #[error("failed to build sink: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("record queue closed")]
    QueueClosed,

    #[error("metrics aggregator stopped")]
    MetricsClosed,

    #[error("{task} gave up after {restarts} restarts: {reason}")]
    GaveUp {
        task: String,
        restarts: u32,
        reason: String,
    },

    #[error("{task} panicked: {reason}")]
    Panicked { task: String, reason: String },
}

pub struct Pipeline {
    config: Config,
    parser: Arc<RecordParser>,
    sink: Arc<dyn RecordSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("parser", &self.parser)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validate `config` and build the parser and the InfluxDB sink.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let parser = RecordParser::new(&config.parser)?;
        let sink = InfluxSink::new(&config.sink)?;

        if parser.layout().timings_shared() {
            warn!(
                layout = ?config.parser.layout,
                "upstream_time and request_time read the same field; request_time is not independent"
            );
        }
        if config.pipeline.tailers > 1 {
            warn!(
                tailers = config.pipeline.tailers,
                path = %config.source.path.display(),
                "every tailer reads the whole file; each line is delivered once per tailer"
            );
        }

        Ok(Self {
            config,
            parser: Arc::new(parser),
            sink: Arc::new(sink),
        })
    }

    /// Replace the sink every worker writes to.
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the configured monitor address and run until `cancel` fires or a
    /// task exhausts its restart budget.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let addr = self.config.monitor.listen_addr()?;
        let listener = logship_monitor::bind(addr).await?;
        self.run_with_listener(listener, cancel).await
    }

    /// Like [`run`](Self::run), serving `/monitor` on an already bound listener.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), PipelineError> {
        let Pipeline {
            config,
            parser,
            sink,
        } = self;
        let restart = RestartPolicy::from_config(&config.pipeline);
        let ingest_cancel = cancel.child_token();
        let service_cancel = CancellationToken::new();

        let (aggregator, metrics) = MetricsAggregator::new(
            config.pipeline.event_capacity,
            config.monitor.window,
            config.monitor.sample_interval(),
        );
        let aggregator_task = tokio::spawn(aggregator.run());
        let sampler = spawn_sampler(
            metrics.clone(),
            config.monitor.sample_interval(),
            service_cancel.clone(),
        );

        let (raw_tx, raw_rx) = bounded::<RawLine>(config.pipeline.queue_capacity);
        let (rec_tx, rec_rx) = bounded::<LogRecord>(config.pipeline.queue_capacity);

        let state = MonitorState::new(metrics.clone(), raw_tx.probe(), rec_tx.probe());
        let server = tokio::spawn(logship_monitor::serve(
            listener,
            state,
            service_cancel.clone(),
        ));

        let mut ingest = JoinSet::new();
        let mut names = HashMap::new();
        let source = LineSource::new(&config.source);
        for i in 0..config.pipeline.tailers {
            let source = source.clone();
            let out = raw_tx.clone();
            let tailer_metrics = metrics.clone();
            let task_cancel = ingest_cancel.clone();
            let name = format!("tailer-{i}");
            let handle = ingest.spawn(supervise(
                name.clone(),
                restart,
                ingest_cancel.clone(),
                move || {
                    let source = source.clone();
                    let out = out.clone();
                    let metrics = tailer_metrics.clone();
                    let cancel = task_cancel.clone();
                    async move { source.run(out, metrics, cancel).await }
                },
            ));
            names.insert(handle.id(), name);

            let parser = Arc::clone(&parser);
            let input = raw_rx.clone();
            let output = rec_tx.clone();
            let parser_metrics = metrics.clone();
            let name = format!("parser-{i}");
            let handle = ingest.spawn(supervise(
                name.clone(),
                restart,
                ingest_cancel.clone(),
                move || {
                    run_parser(
                        Arc::clone(&parser),
                        input.clone(),
                        output.clone(),
                        parser_metrics.clone(),
                    )
                },
            ));
            names.insert(handle.id(), name);
        }
        // The tasks now hold the only queue ends.
        drop((raw_tx, raw_rx, rec_tx));

        let mut sinks = JoinSet::new();
        for id in 0..config.pipeline.sinks {
            let worker = SinkWorker::new(id, Arc::clone(&sink), &config.sink);
            let handle = sinks.spawn(worker.run(rec_rx.clone()));
            names.insert(handle.id(), format!("sink-{id}"));
        }
        drop(rec_rx);

        info!(
            path = %config.source.path.display(),
            tailers = config.pipeline.tailers,
            sinks = config.pipeline.sinks,
            "pipeline running"
        );

        let mut outcome = join_ingest(&mut ingest, &names, &ingest_cancel).await;
        debug!("ingest stopped; draining sinks");

        while let Some(joined) = sinks.join_next().await {
            if let Err(e) = joined {
                let err = panicked(e, &names);
                error!(error = %err, "sink worker panicked");
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        debug!("sinks drained");

        service_cancel.cancel();
        let _ = sampler.await;
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "monitor server failed"),
            Err(e) => error!(error = %e, "monitor server panicked"),
        }
        if metrics.shutdown().await.is_ok() {
            let _ = aggregator_task.await;
        }

        match &outcome {
            Ok(()) => info!("pipeline stopped"),
            Err(e) => error!(error = %e, "pipeline stopped after a fatal error"),
        }
        outcome
    }
}

/// Wait for every tailer and parser task and keep the first failure.
///
/// A panicked task cannot be restarted, so it also cancels the rest of the
/// ingest side.
async fn join_ingest(
    ingest: &mut JoinSet<Result<(), PipelineError>>,
    names: &HashMap<Id, String>,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let mut outcome = Ok(());
    while let Some(joined) = ingest.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => {
                let err = panicked(e, names);
                error!(error = %err, "ingest task panicked");
                cancel.cancel();
                err
            }
        };
        if outcome.is_ok() {
            outcome = Err(failure);
        }
    }
    outcome
}

fn panicked(e: JoinError, names: &HashMap<Id, String>) -> PipelineError {
    PipelineError::Panicked {
        task: names
            .get(&e.id())
            .cloned()
            .unwrap_or_else(|| format!("task {}", e.id())),
        reason: e.to_string(),
    }
}

/// Parse raw lines until the raw queue is closed and drained.
///
/// Malformed lines are counted as errors and skipped. The task only fails if
/// the record queue or the aggregator is gone.
pub async fn run_parser(
    parser: Arc<RecordParser>,
    input: QueueReceiver<RawLine>,
    output: QueueSender<LogRecord>,
    metrics: MetricsHandle,
) -> Result<(), PipelineError> {
    while let Some(line) = input.pop().await {
        match parser.parse(&line) {
            Ok(record) => output
                .push(record)
                .await
                .map_err(|_| PipelineError::QueueClosed)?,
            Err(e) => {
                warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(&line),
                    "skipping malformed line"
                );
                metrics
                    .error()
                    .await
                    .map_err(|_| PipelineError::MetricsClosed)?;
            }
        }
    }
    debug!("parser stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
