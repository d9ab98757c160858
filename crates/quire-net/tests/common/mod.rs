//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quire_config::Configuration;
use quire_net::{Cookie, ForcedLogoutHook, Request, Response, Result, Session, SessionEvent, Transport};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

/// Answers every request that is not a token query.
pub type Responder = Box<dyn Fn(&Request, usize) -> Response + Send + Sync>;

/// In-process transport that records traffic and counts concurrency.
///
/// Token queries (`meta=tokens`) are answered from `token`; `None` makes the
/// token endpoint fail with HTTP 500.
pub struct FakeTransport {
    responder: Responder,
    token: Mutex<Option<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<Request>>,
    token_requests: AtomicUsize,
}

impl FakeTransport {
    pub fn new(responder: impl Fn(&Request, usize) -> Response + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            token: Mutex::new(Some("abc123+\\".to_string())),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            token_requests: AtomicUsize::new(0),
        }
    }

    /// Every non-token request gets `status` and `body`.
    pub fn fixed(status: u16, body: &'static str) -> Self {
        Self::new(move |_, _| Response::new(status, body))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_token(self, token: Option<&str>) -> Self {
        *self.token.lock() = token.map(str::to_string);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Non-token requests, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn token_request_count(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    fn is_token_query(request: &Request) -> bool {
        request
            .query_pairs()
            .iter()
            .any(|(k, v)| k == "meta" && v == "tokens")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        if Self::is_token_query(&request) {
            self.token_requests.fetch_add(1, Ordering::SeqCst);
            let token = self.token.lock().clone();
            return Ok(match token {
                Some(token) => Response::new(
                    200,
                    json!({"batchcomplete": true, "query": {"tokens": {"csrftoken": token}}})
                        .to_string(),
                ),
                None => Response::new(500, "internal error"),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let index = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len() - 1
        };
        let response = (self.responder)(&request, index);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}

/// Counts forced-logout hook invocations.
#[derive(Default)]
pub struct CountingHook {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ForcedLogoutHook for CountingHook {
    async fn force_logout(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingHook {
    /// Wait until the hook has run at least once.
    pub async fn wait_called(&self) -> usize {
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while self.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct EditResult {
    pub edit: EditBody,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct EditBody {
    pub result: String,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ApiErrorBody {
    pub code: String,
}

pub const EDIT_SUCCESS: &str = r#"{"edit":{"result":"Success","pageid":42}}"#;
pub const BAD_TOKEN: &str = r#"{"error":{"code":"badtoken","info":"Invalid CSRF token."}}"#;

pub fn session_with(transport: Arc<FakeTransport>) -> Session {
    session_with_config(Configuration::default(), transport)
}

pub fn session_with_config(config: Configuration, transport: Arc<FakeTransport>) -> Session {
    Session::builder(config)
        .transport(transport)
        .build()
        .expect("session builds")
}

/// Store a central-auth login cookie for the default source domain.
pub fn log_in(session: &Session) {
    let domain = session.config().central_auth.source_domain.clone();
    session
        .cookie_jar()
        .insert(Cookie::new("centralauth_User", "Reader", &domain));
    session
        .cookie_jar()
        .insert(Cookie::new("centralauth_Token", "secret", &domain));
}

/// Drain pending events without waiting.
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
