#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Integration tests for the consumer pipeline.
//!
//! Drives scripted deliveries through `drain` with a real `HttpSink` posting
//! to an in-process stub, and records every acknowledgement call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wxrelay_consumer::dispatch::drain;
use wxrelay_consumer::{Acknowledger, BrokerError, Envelope, HttpSink, MessageHandler};
use wxrelay_testkit::{Reply, StubServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Ack(u64),
    Nack { tag: u64, requeue: bool },
}

const SINK_PATH: &str = "/weather/logs";

/// Shared log of acknowledgement calls across all envelopes of one run.
type CallLog = Arc<Mutex<Vec<Call>>>;

struct LoggedAcker {
    tag: u64,
    log: CallLog,
}

impl Acknowledger for LoggedAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.log.lock().unwrap().push(Call::Ack(self.tag));
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.log.lock().unwrap().push(Call::Nack {
            tag: self.tag,
            requeue,
        });
        Ok(())
    }
}

fn envelopes<B: AsRef<[u8]>>(
    bodies: &[B],
    log: &CallLog,
) -> Vec<Result<Envelope<LoggedAcker>, BrokerError>> {
    bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let tag = u64::try_from(i).unwrap() + 1;
            Ok(Envelope {
                delivery_tag: tag,
                redelivered: false,
                body: body.as_ref().to_vec(),
                acker: LoggedAcker {
                    tag,
                    log: Arc::clone(log),
                },
            })
        })
        .collect()
}

fn handler(url: &str, timeout: Duration) -> MessageHandler<HttpSink> {
    MessageHandler::new(
        HttpSink::new(url, timeout).unwrap(),
        Some("wxrelay-consumer".into()),
        Some("data".into()),
    )
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test]
async fn valid_payload_is_forwarded_and_acked() {
    let stub = StubServer::scripted(vec![Reply::Status(200)]).await;
    let log = CallLog::default();

    let stats = drain(
        tokio_stream::iter(envelopes(&[br#"{"data": {"temp": 21}}"#], &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(stats.acked, 1);
    assert_eq!(*log.lock().unwrap(), vec![Call::Ack(1)]);

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, SINK_PATH);
    assert_eq!(
        requests[0].content_type.as_deref(),
        Some("application/json")
    );

    let body = requests[0].json();
    assert_eq!(body["data"], json!({"temp": 21}));
    assert_eq!(body["processed_by"], "wxrelay-consumer");
    let stamp = body["processed_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
}

#[tokio::test]
async fn missing_field_is_acked_and_never_posted() {
    let stub = StubServer::scripted(vec![]).await;
    let log = CallLog::default();

    drain(
        tokio_stream::iter(envelopes(&[br#"{"foo": 1}"#], &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(*log.lock().unwrap(), vec![Call::Ack(1)]);
    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn missing_field_is_acked_even_when_sink_is_down() {
    let log = CallLog::default();

    drain(
        tokio_stream::iter(envelopes(&[br#"{"foo": 1}"#], &log)),
        &handler("http://127.0.0.1:9/weather/logs", Duration::from_secs(2)),
    )
    .await
    .unwrap();

    assert_eq!(*log.lock().unwrap(), vec![Call::Ack(1)]);
}

#[tokio::test]
async fn malformed_body_is_rejected_without_requeue() {
    let stub = StubServer::scripted(vec![]).await;
    let log = CallLog::default();

    let stats = drain(
        tokio_stream::iter(envelopes(&[b"not-json"], &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(stats.rejected, 1);
    assert_eq!(
        *log.lock().unwrap(),
        vec![Call::Nack {
            tag: 1,
            requeue: false
        }]
    );
    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn server_error_requeues() {
    let stub = StubServer::scripted(vec![Reply::Status(500)]).await;
    let log = CallLog::default();

    drain(
        tokio_stream::iter(envelopes(&[br#"{"data": 1}"#], &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![Call::Nack {
            tag: 1,
            requeue: true
        }]
    );
}

#[tokio::test]
async fn client_error_status_also_requeues() {
    let stub = StubServer::scripted(vec![Reply::Status(404)]).await;
    let log = CallLog::default();

    let stats = drain(
        tokio_stream::iter(envelopes(&[br#"{"data": 1}"#], &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(stats.requeued, 1);
}

#[tokio::test]
async fn sink_timeout_requeues() {
    let stub = StubServer::scripted(vec![Reply::Hang]).await;
    let log = CallLog::default();

    drain(
        tokio_stream::iter(envelopes(&[br#"{"data": 1}"#], &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_millis(200)),
    )
    .await
    .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![Call::Nack {
            tag: 1,
            requeue: true
        }]
    );
    assert_eq!(stub.requests().len(), 1);
}

#[tokio::test]
async fn redelivery_converges_to_one_successful_forward() {
    // The broker redelivers the requeued message; the sink recovers.
    let stub =
        StubServer::scripted(vec![Reply::Status(503), Reply::Status(503), Reply::Status(201)]).await;
    let log = CallLog::default();
    let body: &[u8] = br#"{"data": {"temp": 19.5}}"#;

    let stats = drain(
        tokio_stream::iter(envelopes(&[body, body, body], &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.acked, 1);
    assert_eq!(stub.requests().len(), 3);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            Call::Nack {
                tag: 1,
                requeue: true
            },
            Call::Nack {
                tag: 2,
                requeue: true
            },
            Call::Ack(3),
        ]
    );
}

#[tokio::test]
async fn every_delivery_gets_exactly_one_disposition() {
    let stub = StubServer::scripted(vec![Reply::Status(200), Reply::Status(500)]).await;
    let log = CallLog::default();
    let bodies: [&[u8]; 4] = [
        br#"{"data": 1}"#,
        b"{broken",
        br#"{"other": true}"#,
        br#"{"data": 2}"#,
    ];

    let stats = drain(
        tokio_stream::iter(envelopes(&bodies, &log)),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(stats.total(), 4);
    let calls = log.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            Call::Ack(1),
            Call::Nack {
                tag: 2,
                requeue: false
            },
            Call::Ack(3),
            Call::Nack {
                tag: 4,
                requeue: true
            },
        ]
    );
}

#[tokio::test]
async fn stream_error_ends_drain() {
    let stub = StubServer::scripted(vec![]).await;
    let log = CallLog::default();
    let mut items = envelopes(&[br#"{"data": 1}"#], &log);
    items.push(Err(BrokerError::Consume("connection reset".into())));
    items.extend(envelopes(&[br#"{"data": 2}"#], &log));

    let result = drain(
        tokio_stream::iter(items),
        &handler(&stub.url(SINK_PATH), Duration::from_secs(10)),
    )
    .await;

    assert!(matches!(result, Err(BrokerError::Consume(_))));
    assert_eq!(*log.lock().unwrap(), vec![Call::Ack(1)]);
}
