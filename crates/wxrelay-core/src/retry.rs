//! Retry helpers.
//!
//! Two independent policies:
//! - [`retry_once`]: a failed operation gets exactly one reconnect and exactly
//!   one retry, then the error is surfaced.
//! - [`with_boot_retry`]: fixed-delay attempts for the initial broker
//!   connection at process start.

use std::fmt::Display;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::BootRetry;

/// Run `op` against `state`; on failure call `reconnect` once and retry `op` once.
///
/// A failed reconnect is returned as-is and `op` is not retried. The second
/// failure of `op` is returned to the caller. Nothing is buffered.
pub async fn retry_once<S, T, E>(
    state: &mut S,
    mut op: impl AsyncFnMut(&mut S) -> Result<T, E>,
    mut reconnect: impl AsyncFnMut(&mut S) -> Result<(), E>,
) -> Result<T, E>
where
    E: Display,
{
    match op(&mut *state).await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(error = %e, "Operation failed, reconnecting before a single retry");
            if let Err(reconnect_err) = reconnect(&mut *state).await {
                warn!(error = %reconnect_err, "Reconnect failed, giving up");
                return Err(reconnect_err);
            }
            op(&mut *state).await
        }
    }
}

/// Call `connect` until it succeeds or the boot policy is exhausted.
pub async fn with_boot_retry<T, E>(
    policy: BootRetry,
    what: &str,
    mut connect: impl AsyncFnMut() -> Result<T, E>,
) -> Result<T, E>
where
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        match connect().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.should_retry(attempt) => {
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts = policy.attempts,
                    delay_ms = policy.delay.as_millis(),
                    "Waiting for {what}"
                );
                sleep(policy.delay).await;
                attempt = attempt.saturating_add(1);
            }
            Err(e) => {
                error!(error = %e, attempts = attempt + 1, "Could not reach {what}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Scripted stand-in for a broker link.
    #[derive(Default)]
    struct FakeLink {
        op_failures: u32,
        reconnect_fails: bool,
        op_calls: u32,
        reconnects: u32,
        published: Vec<String>,
    }

    impl FakeLink {
        fn publish(&mut self, msg: &str) -> Result<(), String> {
            self.op_calls += 1;
            if self.op_failures > 0 {
                self.op_failures -= 1;
                return Err("channel closed".into());
            }
            self.published.push(msg.to_string());
            Ok(())
        }

        fn reconnect(&mut self) -> Result<(), String> {
            self.reconnects += 1;
            if self.reconnect_fails {
                Err("connection refused".into())
            } else {
                Ok(())
            }
        }
    }

    async fn publish_with_retry(link: &mut FakeLink, msg: &str) -> Result<(), String> {
        retry_once(
            link,
            async |l: &mut FakeLink| l.publish(msg),
            async |l: &mut FakeLink| l.reconnect(),
        )
        .await
    }

    #[tokio::test]
    async fn success_needs_no_reconnect() {
        let mut link = FakeLink::default();
        publish_with_retry(&mut link, "a").await.unwrap();

        assert_eq!(link.op_calls, 1);
        assert_eq!(link.reconnects, 0);
        assert_eq!(link.published, vec!["a"]);
    }

    #[tokio::test]
    async fn single_failure_is_recovered() {
        let mut link = FakeLink {
            op_failures: 1,
            ..Default::default()
        };
        publish_with_retry(&mut link, "a").await.unwrap();

        assert_eq!(link.op_calls, 2);
        assert_eq!(link.reconnects, 1);
        assert_eq!(link.published, vec!["a"]);
    }

    #[tokio::test]
    async fn second_failure_is_surfaced() {
        let mut link = FakeLink {
            op_failures: 5,
            ..Default::default()
        };
        let err = publish_with_retry(&mut link, "a").await.unwrap_err();

        assert_eq!(err, "channel closed");
        assert_eq!(link.op_calls, 2);
        assert_eq!(link.reconnects, 1);
        assert!(link.published.is_empty());
    }

    #[tokio::test]
    async fn failed_reconnect_skips_retry() {
        let mut link = FakeLink {
            op_failures: 1,
            reconnect_fails: true,
            ..Default::default()
        };
        let err = publish_with_retry(&mut link, "a").await.unwrap_err();

        assert_eq!(err, "connection refused");
        assert_eq!(link.op_calls, 1);
        assert!(link.published.is_empty());
    }

    #[tokio::test]
    async fn boot_retry_stops_on_success() {
        let mut calls = 0u32;
        let result: Result<u32, String> =
            with_boot_retry(BootRetry::new(5, Duration::ZERO), "broker", async || {
                calls += 1;
                if calls < 3 { Err("down".into()) } else { Ok(calls) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn boot_retry_gives_up_after_attempts() {
        let mut calls = 0u32;
        let result: Result<(), String> =
            with_boot_retry(BootRetry::new(4, Duration::ZERO), "broker", async || {
                calls += 1;
                Err("down".into())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 4);
    }
}
