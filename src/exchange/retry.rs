use rand::Rng;
use serde::Deserialize;
use tokio::time::{sleep, timeout, Duration, Instant};

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use super::GatewayError;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};

/// Bounded retry policy for one logical request.
///
/// Every attempt gets at most `attempt_timeout`, and all attempts plus the
/// backoff between them share a single deadline (`budget()`).
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout: Duration::from_secs(5),
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            attempt_timeout,
            ..Default::default()
        }
    }

    pub fn with_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self.clone()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Total wall-clock allowance across all attempts.
    pub fn budget(&self) -> Duration {
        let n = self.attempts();
        self.attempt_timeout * n + Duration::from_millis(self.max_delay_ms) * (n - 1)
    }

    /// Exponential backoff with jitter, clamped to `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2.0_f64.powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        let jitter_range = clamped * self.jitter_factor;
        let jitter: f64 = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_delay = (clamped + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

#[derive(Deserialize, Debug)]
struct BinanceError {
    code: i64,
    msg: String,
}

/// Turn a non-200 response into a rejection, keeping the exchange's error
/// code when the body is structured.
pub fn rejection_from(resp: &HttpResponse) -> GatewayError {
    let err: BinanceError = serde_json::from_str(&resp.body).unwrap_or(BinanceError {
        code: -1,
        msg: resp.body.clone(),
    });
    GatewayError::Rejected {
        status: resp.status,
        code: err.code,
        msg: err.msg,
    }
}

/// Send `req` until a 200 arrives, attempts run out, or the deadline passes.
///
/// Transport failures and non-200 statuses are both retried. If any attempt
/// failed in transport the result is `Transport`, even when a later attempt
/// was rejected, since the earlier request may have landed. A caller seeing
/// `Transport` must treat the outcome as unknown.
pub async fn send_with_retry(
    transport: &dyn Transport,
    req: &HttpRequest,
    policy: &RetryPolicy,
    operation_name: &str,
) -> Result<HttpResponse, GatewayError> {
    let started = Instant::now();
    let budget = policy.budget();
    let max = policy.attempts();
    let mut made = 0u32;
    let mut last_error: Option<GatewayError> = None;
    let mut transport_failure: Option<TransportError> = None;

    for attempt in 0..max {
        let remaining = budget.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        let per_attempt = policy.attempt_timeout.min(remaining);
        let mut attempt_req = req.clone();
        attempt_req.timeout = per_attempt;
        made += 1;

        let outcome = match timeout(per_attempt, transport.send(&attempt_req)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        let err = match outcome {
            Ok(resp) if resp.status == 200 => return Ok(resp),
            Ok(resp) => rejection_from(&resp),
            Err(e) => {
                transport_failure = Some(e.clone());
                GatewayError::Transport {
                    attempts: made,
                    last: e,
                }
            }
        };

        log(
            Level::Warn,
            Domain::Exec,
            "http_attempt_failed",
            obj(&[
                ("op", v_str(operation_name)),
                ("method", v_str(req.method.as_str())),
                ("path", v_str(req.path())),
                ("attempt", v_num((attempt + 1) as f64)),
                ("max_attempts", v_num(max as f64)),
                ("error", v_str(&err.to_string())),
            ]),
        );
        last_error = Some(err);

        if attempt + 1 < max {
            let left = budget.saturating_sub(started.elapsed());
            sleep(policy.delay_for_attempt(attempt).min(left)).await;
        }
    }

    Err(match (transport_failure, last_error) {
        (Some(last), _) => GatewayError::Transport {
            attempts: made,
            last,
        },
        (None, Some(other)) => other,
        (None, None) => GatewayError::Transport {
            attempts: made,
            last: TransportError::Timeout,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::transport::Method;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<HttpResponse, TransportError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<HttpResponse, TransportError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, _req: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(TransportError::Other("script exhausted".into())))
        }
    }

    struct Hangs;

    #[async_trait]
    impl Transport for Hangs {
        async fn send(&self, _req: &HttpRequest) -> Result<HttpResponse, TransportError> {
            std::future::pending().await
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn req() -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: "https://api.binance.com/api/v3/ticker/bookTicker?symbol=BTCUSDT".into(),
            headers: vec![],
            timeout: Duration::from_secs(1),
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_millis(200),
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(1),
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_budget_covers_all_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        assert_eq!(policy.budget(), Duration::from_millis(2000 * 3 + 1000 * 2));
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).attempts(), 1);
    }

    #[tokio::test]
    async fn test_success_first_try_is_not_retried() {
        let t = Scripted::new(vec![ok("{}"), ok("{}")]);
        let resp = send_with_retry(&t, &req(), &fast(3), "test").await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(t.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_then_success() {
        let t = Scripted::new(vec![Err(TransportError::Timeout), ok("{\"a\":1}")]);
        let resp = send_with_retry(&t, &req(), &fast(3), "test").await.unwrap();
        assert_eq!(resp.body, "{\"a\":1}");
        assert_eq!(t.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_transport_reports_attempts() {
        let t = Scripted::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connect("refused".into())),
        ]);
        let err = send_with_retry(&t, &req(), &fast(2), "test").await.unwrap_err();
        match err {
            GatewayError::Transport { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(last, TransportError::Connect("refused".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_200_is_retried_and_surfaces_rejection() {
        let t = Scripted::new(vec![
            Ok(HttpResponse {
                status: 400,
                body: "{\"code\":-1013,\"msg\":\"Filter failure: PRICE_FILTER\"}".into(),
            }),
            Ok(HttpResponse {
                status: 400,
                body: "{\"code\":-1013,\"msg\":\"Filter failure: PRICE_FILTER\"}".into(),
            }),
        ]);
        let err = send_with_retry(&t, &req(), &fast(2), "test").await.unwrap_err();
        assert_eq!(t.calls.load(Ordering::SeqCst), 2);
        match err {
            GatewayError::Rejected { status, code, msg } => {
                assert_eq!(status, 400);
                assert_eq!(code, -1013);
                assert!(msg.contains("PRICE_FILTER"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_then_rejection_stays_unknown_outcome() {
        let t = Scripted::new(vec![
            Err(TransportError::Timeout),
            Ok(HttpResponse {
                status: 400,
                body: "{\"code\":-2010,\"msg\":\"Duplicate order sent.\"}".into(),
            }),
        ]);
        let err = send_with_retry(&t, &req(), &fast(2), "test").await.unwrap_err();
        assert_eq!(t.calls.load(Ordering::SeqCst), 2);
        assert!(err.is_unknown_outcome());
        assert!(matches!(
            err,
            GatewayError::Transport {
                attempts: 2,
                last: TransportError::Timeout,
            }
        ));
    }

    #[tokio::test]
    async fn test_unstructured_error_body_is_kept() {
        let resp = HttpResponse {
            status: 502,
            body: "bad gateway".into(),
        };
        match rejection_from(&resp) {
            GatewayError::Rejected { code, msg, .. } => {
                assert_eq!(code, -1);
                assert_eq!(msg, "bad gateway");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hanging_transport_is_bounded_by_attempt_timeout() {
        let policy = RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(20),
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        };
        let started = std::time::Instant::now();
        let err = send_with_retry(&Hangs, &req(), &policy, "test").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            GatewayError::Transport {
                last: TransportError::Timeout,
                ..
            }
        ));
    }
}
