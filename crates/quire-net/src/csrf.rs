//! Anti-forgery token pipeline for mutating requests.
//!
//! A [`CsrfOperation`] fetches a token (from cache or the token endpoint),
//! injects it where the [`TokenContext`] says, sends the request through the
//! session and decodes the reply as success `T` or API error `E`.
//!
//! ```text
//! Idle → FetchingToken → TokenFetchFailed
//!                      → TokenObtained → Sending → Succeeded | Failed
//! ```
//!
//! A `badtoken` rejection sends the operation back to `FetchingToken` once
//! with the cached token discarded. Cancelling before `Sending` guarantees
//! the mutating request is never issued.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::{Decoded, api_error_code, decode_codable};
use crate::error::{Error, Result};
use crate::queue::TaskHandle;
use crate::request::{BodyEncoding, Endpoint, Method, RequestTemplate};
use crate::session::{Session, SessionEvent};
use crate::transport::Network;

/// Default name of the token parameter on action API writes.
pub const CSRF_TOKEN_PARAMETER: &str = "token";

/// Token handed out to logged-out users.
pub const ANONYMOUS_TOKEN: &str = "+\\";

/// API error code for a stale or foreign token.
pub const BAD_TOKEN_CODE: &str = "badtoken";

/// Where the token goes in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPlacement {
    Body,
    Query,
}

/// Token injection rule for one kind of mutating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub parameter: String,
    pub placement: TokenPlacement,
}

impl TokenContext {
    /// Inject the token into the request body as `parameter`.
    pub fn body(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            placement: TokenPlacement::Body,
        }
    }

    /// Inject the token into the query string as `parameter`.
    pub fn query(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            placement: TokenPlacement::Query,
        }
    }

    fn inject(&self, template: &mut RequestTemplate, token: &str) {
        match self.placement {
            TokenPlacement::Query => {
                template
                    .endpoint
                    .query
                    .retain(|(k, _)| k != &self.parameter);
                template
                    .endpoint
                    .query
                    .push((self.parameter.clone(), token.to_string()));
            }
            TokenPlacement::Body => {
                template
                    .body
                    .get_or_insert_with(Map::new)
                    .insert(self.parameter.clone(), Value::String(token.to_string()));
            }
        }
    }
}

impl Default for TokenContext {
    fn default() -> Self {
        Self::body(CSRF_TOKEN_PARAMETER)
    }
}

/// A fetched anti-forgery token.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken {
    value: String,
}

impl CsrfToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the token was issued to a logged-in identity.
    pub fn is_authorized(&self) -> bool {
        self.value != ANONYMOUS_TOKEN
    }
}

impl std::fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfToken")
            .field("authorized", &self.is_authorized())
            .finish()
    }
}

/// Result of the token step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenFetch {
    Token(CsrfToken),
    /// The target accepts the request without a token.
    NotRequired,
}

/// Source of anti-forgery tokens.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Obtain a token valid for requests to `target`.
    async fn fetch_token(&self, session: &Session, target: &Endpoint) -> Result<TokenFetch>;

    /// Forget cached tokens for `target`, or all of them for `None`.
    fn invalidate(&self, target: Option<&Endpoint>);
}

/// Fetches tokens from the wiki action API and caches them per host.
///
/// Anonymous tokens are not cached so a login is picked up on the next
/// operation.
#[derive(Debug, Default)]
pub struct ApiTokenFetcher {
    cache: Mutex<HashMap<String, CsrfToken>>,
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    query: TokensQuery,
}

#[derive(Debug, Deserialize)]
struct TokensQuery {
    tokens: Tokens,
}

#[derive(Debug, Deserialize)]
struct Tokens {
    csrftoken: String,
}

impl ApiTokenFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_key(target: &Endpoint) -> String {
        match target.port {
            Some(port) => format!("{}:{}", target.host.to_ascii_lowercase(), port),
            None => target.host.to_ascii_lowercase(),
        }
    }

    fn token_endpoint(session: &Session, target: &Endpoint) -> Endpoint {
        Endpoint {
            scheme: target.scheme.clone(),
            host: target.host.clone(),
            port: target.port,
            path: session.config().action_api_path(&target.host).to_string(),
            query: Vec::new(),
        }
        .with_query_items([
            ("action", "query"),
            ("meta", "tokens"),
            ("type", "csrf"),
            ("format", "json"),
        ])
    }
}

#[async_trait]
impl TokenFetcher for ApiTokenFetcher {
    async fn fetch_token(&self, session: &Session, target: &Endpoint) -> Result<TokenFetch> {
        let key = Self::cache_key(target);
        if let Some(token) = self.cache.lock().get(&key).cloned() {
            debug!(host = %key, "Using cached CSRF token");
            return Ok(TokenFetch::Token(token));
        }

        let endpoint = Self::token_endpoint(session, target);
        let request = session.request(&endpoint, Method::Get, None, BodyEncoding::Json)?;
        let response = session
            .execute(request, Network::Default)
            .await
            .map_err(|e| Error::TokenFetch(e.to_string()))?;

        if response.status != 200 {
            return Err(Error::TokenFetch(format!(
                "token endpoint returned HTTP {}",
                response.status
            )));
        }

        let parsed: TokensResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::TokenFetch(format!("unexpected token response: {}", e)))?;
        let value = parsed.query.tokens.csrftoken;
        if value.is_empty() {
            return Err(Error::TokenFetch("empty token".to_string()));
        }

        let token = CsrfToken::new(value);
        if token.is_authorized() {
            self.cache.lock().insert(key, token.clone());
        }
        debug!(authorized = token.is_authorized(), "Fetched CSRF token");
        Ok(TokenFetch::Token(token))
    }

    fn invalidate(&self, target: Option<&Endpoint>) {
        let mut cache = self.cache.lock();
        match target {
            Some(target) => {
                cache.remove(&Self::cache_key(target));
            }
            None => cache.clear(),
        }
    }
}

/// Lifecycle of a [`CsrfOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfState {
    Idle,
    FetchingToken,
    TokenFetchFailed,
    TokenObtained,
    Sending,
    Succeeded,
    Failed,
    Cancelled,
}

impl CsrfState {
    /// Whether the operation can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CsrfState::TokenFetchFailed
                | CsrfState::Succeeded
                | CsrfState::Failed
                | CsrfState::Cancelled
        )
    }
}

/// What a completed operation reports.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrfOutcome<T, E> {
    /// Decoded success payload.
    pub result: Option<T>,
    /// Decoded API error payload; the server rejected this request.
    pub api_error: Option<E>,
    /// Whether the token used belonged to a logged-in identity.
    pub authorized: bool,
}

/// One CSRF-guarded request. Consumed by [`start`](Self::start).
pub struct CsrfOperation<T, E> {
    session: Session,
    template: RequestTemplate,
    context: TokenContext,
    network: Network,
    state: watch::Sender<CsrfState>,
    cancel: CancellationToken,
    _payload: PhantomData<fn() -> (T, E)>,
}

impl<T, E> CsrfOperation<T, E>
where
    T: DeserializeOwned + Send + 'static,
    E: DeserializeOwned + Send + 'static,
{
    pub fn new(session: Session, template: RequestTemplate, context: TokenContext) -> Self {
        let (state, _) = watch::channel(CsrfState::Idle);
        Self {
            session,
            template,
            context,
            network: Network::Default,
            state,
            cancel: CancellationToken::new(),
            _payload: PhantomData,
        }
    }

    /// Send the request on a different client.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Enqueue the operation on the session's task queue.
    pub fn start(self) -> CsrfHandle<T, E> {
        let state = self.state.subscribe();
        let cancel = self.cancel.clone();
        let queue = self.session.queue().clone();
        let task = queue.spawn_with_token(self.run(), cancel);
        CsrfHandle { task, state }
    }

    fn transition(&self, next: CsrfState) {
        debug!(state = ?next, url_host = %self.template.endpoint.host, "CSRF operation state");
        self.state.send_replace(next);
    }

    fn fail(&self, state: CsrfState, error: Error) -> Error {
        self.transition(state);
        error
    }

    async fn run(self) -> Result<CsrfOutcome<T, E>> {
        let fetcher = self.session.token_fetcher();
        let mut retried = false;

        loop {
            self.transition(CsrfState::FetchingToken);
            let fetched = match fetcher.fetch_token(&self.session, &self.template.endpoint).await {
                Ok(fetched) => fetched,
                Err(Error::Cancelled) => return Err(self.fail(CsrfState::Cancelled, Error::Cancelled)),
                Err(e) => {
                    warn!(error = %e, "CSRF token fetch failed");
                    let e = match e {
                        Error::TokenFetch(_) => e,
                        other => Error::TokenFetch(other.to_string()),
                    };
                    return Err(self.fail(CsrfState::TokenFetchFailed, e));
                }
            };
            self.transition(CsrfState::TokenObtained);

            let mut template = self.template.clone();
            let authorized = match &fetched {
                TokenFetch::Token(token) => {
                    self.context.inject(&mut template, token.value());
                    token.is_authorized()
                }
                TokenFetch::NotRequired => self.session.is_authenticated(),
            };

            if self.cancel.is_cancelled() {
                return Err(self.fail(CsrfState::Cancelled, Error::Cancelled));
            }

            let request = template
                .build(self.session.user_agent())
                .map_err(|e| self.fail(CsrfState::Failed, e))?;

            self.transition(CsrfState::Sending);
            let response = self
                .session
                .execute(request, self.network)
                .await
                .map_err(|e| self.fail(CsrfState::Failed, e))?;

            if !retried
                && matches!(fetched, TokenFetch::Token(_))
                && api_error_code(&response.body).as_deref() == Some(BAD_TOKEN_CODE)
            {
                info!("Token rejected by server, retrying with a fresh token");
                fetcher.invalidate(Some(&self.template.endpoint));
                retried = true;
                continue;
            }

            return match decode_codable::<T, E>(&response) {
                Ok(Decoded::Success(value)) => {
                    self.transition(CsrfState::Succeeded);
                    if authorized {
                        self.session.announce(SessionEvent::AuthorizedEditCommitted);
                    }
                    Ok(CsrfOutcome {
                        result: Some(value),
                        api_error: None,
                        authorized,
                    })
                }
                Ok(Decoded::ErrorPayload(error)) => {
                    self.transition(CsrfState::Failed);
                    Ok(CsrfOutcome {
                        result: None,
                        api_error: Some(error),
                        authorized,
                    })
                }
                Err(e) => Err(self.fail(CsrfState::Failed, e)),
            };
        }
    }
}

/// Handle to a started [`CsrfOperation`]; await it for the outcome.
pub struct CsrfHandle<T, E> {
    task: TaskHandle<CsrfOutcome<T, E>>,
    state: watch::Receiver<CsrfState>,
}

impl<T, E> CsrfHandle<T, E> {
    /// Cancel the operation. Has no network effect once `Sending` began
    /// and the request already left.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Current state of the operation.
    pub fn state(&self) -> CsrfState {
        let state = *self.state.borrow();
        if !state.is_terminal() && self.task.cancellation_token().is_cancelled() {
            CsrfState::Cancelled
        } else {
            state
        }
    }

    /// Whether the operation has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T, E> Future for CsrfHandle<T, E> {
    type Output = Result<CsrfOutcome<T, E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx)
    }
}
