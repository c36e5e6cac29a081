//! Sink integration harness.
//!
//! # What this covers
//!
//! - **Wire format**: the InfluxDB writer posts one line-protocol point per
//!   record to `/write` with the configured database and precision.
//! - **Retry**: 5xx responses are retried until the backend recovers.
//! - **Rejection**: 4xx responses drop the batch and the worker carries on.
//! - **Drain**: workers sharing one record queue deliver every record once and
//!   exit when the queue closes.
//!
//! # Running
//!
//! ```sh
//! cargo test --test sink_harness
//! ```

mod common;
use common::*;

use logship_core::config::SinkConfig;
use logship_core::queue::bounded;
use logship_feeds::{InfluxSink, RecordSink, SinkError, SinkWorker};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn sink_config(influx: &FakeInflux) -> SinkConfig {
    SinkConfig {
        url: influx.base_url(),
        batch_size: 4,
        max_attempts: 4,
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
        ..SinkConfig::default()
    }
}

#[tokio::test]
async fn batch_is_written_as_line_protocol() {
    let influx = FakeInflux::start().await.unwrap();
    let sink = InfluxSink::new(&sink_config(&influx)).unwrap();

    let batch = vec![
        LogRecordBuilder::new("/api/test")
            .bytes_sent(1024)
            .timings(0.012, 0.02)
            .build(),
        LogRecordBuilder::new("/api/orders")
            .method("POST")
            .status("201")
            .build(),
    ];
    sink.accept(&batch).await.unwrap();

    let points = influx.points().await;
    assert_eq!(points.len(), 2);
    assert_points_in!(points, "nginx_log");
    assert!(
        points[0].starts_with(
            "nginx_log,Path=/api/test,Method=GET,Schema=HTTP/1.1,Status=200 \
             UpstreamTime=0.012,RequestTime=0.02,BytesSent=1024i "
        ),
        "{}",
        points[0]
    );
    assert!(points[1].contains("Method=POST"), "{}", points[1]);

    let query = influx.last_query().await;
    assert_eq!(query.get("db").map(String::as_str), Some("mydb"));
    assert_eq!(query.get("precision").map(String::as_str), Some("s"));
}

#[tokio::test]
async fn rejection_and_outage_are_reported_distinctly() {
    let influx = FakeInflux::start().await.unwrap();
    let sink = InfluxSink::new(&sink_config(&influx)).unwrap();
    influx.respond_with([400, 500]).await;

    let batch = records(1);
    let rejected = sink.accept(&batch).await.unwrap_err();
    assert!(matches!(rejected, SinkError::Rejected { status: 400, .. }), "{rejected:?}");
    let unavailable = sink.accept(&batch).await.unwrap_err();
    assert!(unavailable.is_retryable(), "{unavailable:?}");

    sink.accept(&batch).await.unwrap();
    assert_eq!(influx.points().await.len(), 1);
}

#[tokio::test]
async fn unreachable_backend_is_retryable() {
    let config = SinkConfig {
        url: "http://127.0.0.1:1".to_string(),
        timeout_ms: 500,
        ..SinkConfig::default()
    };
    let err = InfluxSink::new(&config)
        .unwrap()
        .accept(&records(1))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

#[tokio::test]
async fn worker_rides_out_a_short_outage() {
    let influx = FakeInflux::start().await.unwrap();
    let config = sink_config(&influx);
    let sink: Arc<dyn RecordSink> = Arc::new(InfluxSink::new(&config).unwrap());
    influx.respond_with([503, 503]).await;

    let (tx, rx) = bounded(16);
    for record in records(3) {
        tx.push(record).await.unwrap();
    }
    drop(tx);

    tokio::time::timeout(
        Duration::from_secs(5),
        SinkWorker::new(0, sink, &config).run(rx),
    )
    .await
    .expect("worker drains and exits");

    assert_eq!(influx.points().await.len(), 3);
    assert_eq!(influx.requests().await, 3);
}

#[tokio::test]
async fn worker_drops_rejected_batch_and_continues() {
    let influx = FakeInflux::start().await.unwrap();
    let mut config = sink_config(&influx);
    config.batch_size = 1;
    let sink: Arc<dyn RecordSink> = Arc::new(InfluxSink::new(&config).unwrap());
    influx.respond_with([400]).await;

    let (tx, rx) = bounded(16);
    for record in records(3) {
        tx.push(record).await.unwrap();
    }
    drop(tx);

    SinkWorker::new(0, sink, &config).run(rx).await;

    let points = influx.points().await;
    assert_eq!(points.len(), 2);
    assert!(points[0].contains("Path=/r/1"), "{}", points[0]);
    assert!(points[1].contains("Path=/r/2"), "{}", points[1]);
}

#[tokio::test]
async fn workers_sharing_a_queue_deliver_each_record_once() {
    let influx = FakeInflux::start().await.unwrap();
    let config = sink_config(&influx);
    let sink: Arc<dyn RecordSink> = Arc::new(InfluxSink::new(&config).unwrap());

    let (tx, rx) = bounded(8);
    let workers: Vec<_> = (0..4)
        .map(|id| tokio::spawn(SinkWorker::new(id, Arc::clone(&sink), &config).run(rx.clone())))
        .collect();
    drop(rx);

    for record in records(40) {
        tx.push(record).await.unwrap();
    }
    drop(tx);
    let joined = tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(workers))
        .await
        .expect("workers exit once the queue closes");
    for worker in joined {
        worker.unwrap();
    }

    let points = influx.points().await;
    assert_eq!(points.len(), 40);
    let mut paths: Vec<String> = points
        .iter()
        .map(|p| p.split(',').nth(1).unwrap().to_string())
        .collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 40);
}
