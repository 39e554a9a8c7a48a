//! Publish engine: POST to the ingestion endpoint with bounded retry
//!
//! The engine is stateless between calls. Health bookkeeping and status
//! projection happen in the caller, which reads the returned [`Response`].

use super::payload;
use super::response::Response;
use super::retry::{classify, Outcome, RetryPolicy};
use crate::clock::Clock;
use crate::error::PublishError;
use crate::observability::DebugLog;
use crate::publish_span;
use crate::transport::{HttpReply, HttpRequest, HttpTransport};
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Path of the ingestion endpoint under the base URL
pub const INGEST_PATH: &str = "/api/ingest";

/// `User-Agent` sent with every request
pub const USER_AGENT: &str = concat!("fieldnode/", env!("CARGO_PKG_VERSION"));

/// Delivers documents to `{base_url}/api/ingest`
pub struct PublishEngine {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    endpoint: String,
    api_key: String,
}

impl PublishEngine {
    /// `base_url` must already be normalized (no trailing slash)
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        base_url: &str,
        api_key: &str,
    ) -> Self {
        Self {
            transport,
            clock,
            endpoint: format!("{base_url}{INGEST_PATH}"),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, document: &str, policy: &RetryPolicy) -> HttpRequest {
        HttpRequest {
            url: self.endpoint.clone(),
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                ("x-api-key", self.api_key.clone()),
                ("User-Agent", USER_AGENT.to_string()),
                ("Connection", "close".to_string()),
            ],
            body: document.to_string(),
            timeout: policy.http_timeout(),
        }
    }

    /// Validate and post `document`, retrying per `policy`
    ///
    /// Returns without any exchange when the link is down or the document is
    /// not a `{"payload": ...}` object.
    pub async fn publish(
        &self,
        document: &str,
        policy: &RetryPolicy,
        link_up: bool,
        log: &DebugLog,
    ) -> Response {
        if !link_up {
            log.line(|| "Cannot perform HTTP request - link not connected".to_string());
            return Response::rejected(PublishError::LinkDown);
        }
        if let Err(e) = payload::validate(document) {
            log.line(|| format!("JSON validation failed: {e}"));
            return Response::rejected(e);
        }

        let span = publish_span!(endpoint = %self.endpoint, max_attempts = policy.max_attempts);
        self.attempt_loop(document, policy, log)
            .instrument(span)
            .await
    }

    async fn attempt_loop(&self, document: &str, policy: &RetryPolicy, log: &DebugLog) -> Response {
        let request = self.request(document, policy);
        let started = self.clock.now_ms();
        let budget_ms = policy.worst_case_ms();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let HttpReply { code, body } = self.transport.post(&request).await;
            log.line(|| {
                format!(
                    "HTTP attempt {attempt}/{}: code {code}, body {}",
                    policy.max_attempts,
                    String::from_utf8_lossy(&body)
                )
            });
            debug!(attempt, code, "Publish attempt finished");

            let error = match classify(code) {
                Outcome::Delivered => return Response::success(code, body),
                Outcome::Terminal(error) => {
                    warn!(code, error = %error, "Publish rejected, not retrying");
                    let detail = error.to_string();
                    return Response::failed(code, body, &error, detail);
                }
                Outcome::Retryable(error) => error,
            };

            if attempt >= policy.max_attempts {
                warn!(
                    code,
                    attempts = attempt,
                    error = %error,
                    "Publish failed, all retries exhausted"
                );
                let detail = error.exhausted_detail();
                return Response::failed(code, body, &error, detail);
            }

            let delay = policy.delay_for(attempt);
            let elapsed = self.clock.now_ms().saturating_sub(started);
            if elapsed.saturating_add(delay) > budget_ms {
                warn!(
                    code,
                    attempts = attempt,
                    elapsed_ms = elapsed,
                    budget_ms,
                    "Publish failed, time budget spent"
                );
                let detail = error.exhausted_detail();
                return Response::failed(code, body, &error, detail);
            }

            log.line(|| format!("Request failed ({error}), retrying in {delay}ms..."));
            self.clock.sleep_ms(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{MemorySink, MockClock, MockHttpTransport};

    struct Harness {
        engine: PublishEngine,
        http: MockHttpTransport,
        clock: MockClock,
        sink: MemorySink,
    }

    fn harness(replies: &[i32]) -> Harness {
        let http = MockHttpTransport::new();
        for code in replies {
            http.push_reply(*code, "");
        }
        let clock = MockClock::new();
        let sink = MemorySink::new();
        let engine = PublishEngine::new(
            Arc::new(http.clone()),
            Arc::new(clock.clone()),
            "https://ex.test",
            "k",
        );
        Harness {
            engine,
            http,
            clock,
            sink,
        }
    }

    impl Harness {
        fn log(&self, enabled: bool) -> DebugLog {
            DebugLog::new(Arc::new(self.sink.clone()), enabled)
        }
    }

    const DOC: &str = r#"{"payload":{"temperature":1.0}}"#;

    /// Answers 503 after holding the clock for `hold_ms`
    struct SlowTransport {
        clock: MockClock,
        hold_ms: u64,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl HttpTransport for SlowTransport {
        async fn post(&self, _request: &HttpRequest) -> HttpReply {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.clock.advance(self.hold_ms);
            HttpReply::new(503, bytes::Bytes::new())
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let h = harness(&[201]);
        let response = h
            .engine
            .publish(DOC, &RetryPolicy::new(3, 10, 100), true, &h.log(false))
            .await;
        assert!(response.ok);
        assert_eq!(response.http_code, 201);
        assert_eq!(h.http.request_count(), 1);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let h = harness(&[200]);
        h.engine
            .publish(DOC, &RetryPolicy::new(1, 10, 750), true, &h.log(false))
            .await;
        let request = &h.http.requests()[0];
        assert_eq!(request.url, "https://ex.test/api/ingest");
        assert_eq!(request.body, DOC);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("X-API-Key"), Some("k"));
        assert_eq!(request.header("user-agent"), Some(USER_AGENT));
        assert_eq!(request.header("connection"), Some("close"));
        assert_eq!(request.timeout.as_millis(), 750);
    }

    #[tokio::test]
    async fn test_link_down_makes_no_attempt() {
        let h = harness(&[200]);
        let response = h
            .engine
            .publish(DOC, &RetryPolicy::default(), false, &h.log(false))
            .await;
        assert_eq!(response.error_kind, ErrorKind::LinkDown);
        assert_eq!(h.http.request_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_makes_no_attempt() {
        let h = harness(&[200]);
        let response = h
            .engine
            .publish(r#"{"other":1}"#, &RetryPolicy::default(), true, &h.log(false))
            .await;
        assert_eq!(response.error_kind, ErrorKind::InvalidPayload);
        assert_eq!(response.http_code, 0);
        assert_eq!(h.http.request_count(), 0);
    }

    #[tokio::test]
    async fn test_terminal_codes_are_not_retried() {
        for (code, kind) in [(401, ErrorKind::AuthRejected), (400, ErrorKind::BadRequest)] {
            let h = harness(&[code, 200]);
            let response = h
                .engine
                .publish(DOC, &RetryPolicy::new(3, 10, 100), true, &h.log(false))
                .await;
            assert!(!response.ok);
            assert_eq!(response.http_code, code);
            assert_eq!(response.error_kind, kind);
            assert_eq!(h.http.request_count(), 1);
            assert_eq!(h.clock.now_ms(), 0, "no backoff after terminal code");
        }
    }

    #[tokio::test]
    async fn test_retries_with_linear_backoff() {
        let h = harness(&[503, 503, 200]);
        let response = h
            .engine
            .publish(DOC, &RetryPolicy::new(3, 10, 100), true, &h.log(false))
            .await;
        assert!(response.ok);
        assert_eq!(response.http_code, 200);
        assert_eq!(h.http.request_count(), 3);
        assert_eq!(h.clock.sleeps(), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_classification() {
        let h = harness(&[503, 500, -11]);
        let response = h
            .engine
            .publish(DOC, &RetryPolicy::new(3, 10, 100), true, &h.log(false))
            .await;
        assert!(!response.ok);
        assert_eq!(response.http_code, -11);
        assert_eq!(response.error_kind, ErrorKind::Transport);
        assert!(response.error_detail.ends_with("all retries exhausted"));
        assert_eq!(h.http.request_count(), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_transport_failure() {
        let h = harness(&[-1]);
        let response = h
            .engine
            .publish(DOC, &RetryPolicy::new(1, 10, 100), true, &h.log(false))
            .await;
        assert_eq!(response.error_kind, ErrorKind::Transport);
        assert_eq!(h.http.request_count(), 1);
        assert!(h.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_status_is_success() {
        let h = harness(&[302]);
        let response = h
            .engine
            .publish(DOC, &RetryPolicy::default(), true, &h.log(false))
            .await;
        assert!(response.ok);
        assert_eq!(response.error_kind, ErrorKind::None);
    }

    #[tokio::test]
    async fn test_debug_lines_per_attempt() {
        let h = harness(&[500, 201]);
        h.engine
            .publish(DOC, &RetryPolicy::new(2, 10, 100), true, &h.log(true))
            .await;
        let attempts: Vec<String> = h
            .sink
            .lines()
            .into_iter()
            .filter(|l| l.starts_with("HTTP attempt"))
            .collect();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].starts_with("HTTP attempt 1/2: code 500"));
    }

    #[tokio::test]
    async fn test_silent_when_debug_disabled() {
        let h = harness(&[500, 500]);
        h.engine
            .publish(DOC, &RetryPolicy::new(2, 10, 100), true, &h.log(false))
            .await;
        assert_eq!(h.sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_retries_stop_at_time_budget() {
        let clock = MockClock::new();
        let transport = Arc::new(SlowTransport {
            clock: clock.clone(),
            hold_ms: 200,
            calls: Default::default(),
        });
        let engine = PublishEngine::new(
            transport.clone(),
            Arc::new(clock.clone()),
            "https://ex.test",
            "k",
        );
        let log = DebugLog::new(Arc::new(MemorySink::new()), false);

        // Budget is 3 x 100 + 10 + 20 = 330 ms; the second attempt ends at 410 ms
        let response = engine
            .publish(DOC, &RetryPolicy::new(3, 10, 100), true, &log)
            .await;

        assert_eq!(response.error_kind, ErrorKind::ServiceUnavailable);
        assert!(response.error_detail.ends_with("all retries exhausted"));
        assert_eq!(
            transport.calls.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
        assert_eq!(clock.sleeps(), vec![10]);
    }
}
