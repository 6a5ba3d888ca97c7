//! Per-message processing.
//!
//! Each delivery walks `decode -> augment -> validate -> forward` and ends in
//! exactly one terminal [`Outcome`]:
//!
//! | Step     | Failure                   | Outcome     | Disposition     |
//! |----------|---------------------------|-------------|-----------------|
//! | decode   | body is not a JSON object | `Rejected`  | `RejectDiscard` |
//! | validate | required field missing    | `Skipped`   | `Ack`           |
//! | forward  | transport error, non-2xx  | `Requeued`  | `RejectRequeue` |
//! | forward  | -                         | `Forwarded` | `Ack`           |

use chrono::Utc;
use tracing::{debug, info, warn};
use wxrelay_core::{Disposition, payload};

use crate::sink::Sink;

/// Terminal state of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Malformed body; dropped.
    Rejected,
    /// Well-formed but missing the required field; consumed as a no-op.
    Skipped,
    /// The sink accepted the payload.
    Forwarded,
    /// The sink failed; the broker should redeliver.
    Requeued,
}

impl Outcome {
    pub const fn disposition(self) -> Disposition {
        match self {
            Self::Rejected => Disposition::RejectDiscard,
            Self::Skipped | Self::Forwarded => Disposition::Ack,
            Self::Requeued => Disposition::RejectRequeue,
        }
    }
}

/// Drives message bodies through the relay pipeline.
#[derive(Debug, Clone)]
pub struct MessageHandler<S> {
    sink: S,
    /// Provenance marker; `None` disables augmentation.
    processed_by: Option<String>,
    /// Top-level key a payload must carry; `None` disables validation.
    required_field: Option<String>,
}

impl<S: Sink> MessageHandler<S> {
    pub const fn new(
        sink: S,
        processed_by: Option<String>,
        required_field: Option<String>,
    ) -> Self {
        Self {
            sink,
            processed_by,
            required_field,
        }
    }

    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Process one message body and return the disposition to apply.
    pub async fn handle(&self, body: &[u8]) -> Disposition {
        self.process(body).await.disposition()
    }

    /// Process one message body and return its terminal state.
    pub async fn process(&self, body: &[u8]) -> Outcome {
        let mut data = match payload::decode(body) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, bytes = body.len(), "Failed to decode message, discarding");
                return Outcome::Rejected;
            }
        };

        if let Some(processed_by) = &self.processed_by {
            let inserted = payload::augment(&mut data, processed_by, Utc::now());
            debug!(?inserted, "Payload augmented");
        }

        if let Some(field) = self
            .required_field
            .as_deref()
            .filter(|field| !payload::has_field(&data, field))
        {
            warn!(field = %field, "Invalid payload structure, missing required field");
            return Outcome::Skipped;
        }

        match self.sink.forward(&data).await {
            Ok(()) => {
                info!("Payload forwarded to sink");
                Outcome::Forwarded
            }
            Err(e) => {
                warn!(error = %e, "Failed to forward payload, requeueing");
                Outcome::Requeued
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;
    use wxrelay_core::Payload;
    use wxrelay_core::payload::{PROCESSED_AT, PROCESSED_BY};

    use super::*;
    use crate::sink::SinkError;

    /// Sink that replays scripted results and records what it received.
    #[derive(Default)]
    struct ScriptedSink {
        results: Mutex<VecDeque<Result<(), SinkError>>>,
        received: Mutex<Vec<Payload>>,
    }

    impl ScriptedSink {
        fn with(results: Vec<Result<(), SinkError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                received: Mutex::default(),
            }
        }

        fn received(&self) -> Vec<Payload> {
            self.received.lock().unwrap().clone()
        }
    }

    impl Sink for ScriptedSink {
        async fn forward(&self, payload: &Payload) -> Result<(), SinkError> {
            self.received.lock().unwrap().push(payload.clone());
            self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn augmenting(sink: ScriptedSink) -> MessageHandler<ScriptedSink> {
        MessageHandler::new(sink, Some("wxrelay-consumer".into()), Some("data".into()))
    }

    #[tokio::test]
    async fn valid_payload_is_augmented_and_acked() {
        let handler = augmenting(ScriptedSink::default());
        let outcome = handler.process(br#"{"data": {"temp": 21}}"#).await;

        assert_eq!(outcome, Outcome::Forwarded);
        assert_eq!(outcome.disposition(), Disposition::Ack);

        let sent = handler.sink().received();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["data"], json!({"temp": 21}));
        assert_eq!(sent[0][PROCESSED_BY], "wxrelay-consumer");
        let stamp = sent[0][PROCESSED_AT].as_str().expect("timestamp string");
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test]
    async fn missing_field_is_acked_without_forwarding() {
        let handler = augmenting(ScriptedSink::with(vec![Err(SinkError::Request(
            "unreachable".into(),
        ))]));
        let disposition = handler.handle(br#"{"foo": 1}"#).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(handler.sink().received().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_discarded() {
        let handler = augmenting(ScriptedSink::default());

        assert_eq!(handler.handle(b"not-json").await, Disposition::RejectDiscard);
        assert_eq!(handler.handle(b"[1,2,3]").await, Disposition::RejectDiscard);
        assert!(handler.sink().received().is_empty());
    }

    #[tokio::test]
    async fn sink_status_failure_requeues() {
        let handler = augmenting(ScriptedSink::with(vec![Err(SinkError::Status {
            status: 500,
            body: "boom".into(),
        })]));

        assert_eq!(
            handler.handle(br#"{"data": 1}"#).await,
            Disposition::RejectRequeue
        );
    }

    #[tokio::test]
    async fn sink_timeout_requeues() {
        let handler = augmenting(ScriptedSink::with(vec![Err(SinkError::Timeout(
            "deadline".into(),
        ))]));

        assert_eq!(handler.process(br#"{"data": 1}"#).await, Outcome::Requeued);
    }

    #[tokio::test]
    async fn passthrough_forwards_body_untouched() {
        let handler = MessageHandler::new(ScriptedSink::default(), None, None);
        let outcome = handler.process(br#"{"foo": 1}"#).await;

        assert_eq!(outcome, Outcome::Forwarded);
        let sent = handler.sink().received();
        assert_eq!(serde_json::Value::Object(sent[0].clone()), json!({"foo": 1}));
    }
}
