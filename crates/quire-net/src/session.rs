//! The session façade.
//!
//! A [`Session`] is the single way feature code reaches the network. It is
//! built once from a [`Configuration`] and cloned cheaply into every
//! collaborator; all clones share one cookie jar, one task queue and one
//! authentication cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use quire_config::Configuration;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::{AuthStateCache, has_valid_central_auth_cookies};
use crate::cookies::CookieJar;
use crate::csrf::{ApiTokenFetcher, CsrfHandle, CsrfOperation, TokenContext, TokenFetcher};
use crate::decode::{Decoded, decode_codable, decode_decodable, decode_json_object};
use crate::error::{Error, Result};
use crate::queue::{TaskHandle, TaskQueue};
use crate::request::{BodyEncoding, Endpoint, Method, Request, RequestTemplate, build_request};
use crate::response::{Disposition, Response, classify};
use crate::transport::{HttpTransport, Network, Transport};

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Process-wide notifications published by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Cookies were cloned or cleared.
    CookiesChanged,
    /// A 401 response revoked the login.
    ForcedLogout,
    /// A CSRF-guarded write by a logged-in user succeeded.
    AuthorizedEditCommitted,
}

/// Collaborator that clears stored credentials when the server revokes the
/// login.
#[async_trait]
pub trait ForcedLogoutHook: Send + Sync {
    async fn force_logout(&self);
}

/// Shared HTTP session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: Configuration,
    user_agent: String,
    jar: Arc<CookieJar>,
    default_transport: Arc<dyn Transport>,
    restricted_transport: Arc<dyn Transport>,
    queue: TaskQueue,
    auth: AuthStateCache,
    token_fetcher: Arc<dyn TokenFetcher>,
    events: broadcast::Sender<SessionEvent>,
    logout_hook: RwLock<Option<Arc<dyn ForcedLogoutHook>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_agent", &self.inner.user_agent)
            .field("queue", &self.inner.queue)
            .field("jar", &self.inner.jar)
            .finish()
    }
}

impl Session {
    /// Create a session builder.
    pub fn builder(config: Configuration) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Create a session with real HTTP transports.
    pub fn new(config: Configuration) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn user_agent(&self) -> &str {
        &self.inner.user_agent
    }

    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.inner.jar
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    pub fn token_fetcher(&self) -> Arc<dyn TokenFetcher> {
        self.inner.token_fetcher.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Install the credential-clearing collaborator called on a 401.
    pub fn set_forced_logout_hook(&self, hook: Arc<dyn ForcedLogoutHook>) {
        *self.inner.logout_hook.write() = Some(hook);
    }

    pub(crate) fn announce(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request building
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a request carrying this session's headers.
    ///
    /// The user agent is checked when the session is built, so the only
    /// failure left is an endpoint that does not form a valid URL.
    pub fn request(
        &self,
        endpoint: &Endpoint,
        method: Method,
        body: Option<&Map<String, Value>>,
        encoding: BodyEncoding,
    ) -> Result<Request> {
        build_request(endpoint, method, body, encoding, &self.inner.user_agent)
    }

    /// Action API endpoint for `host`, or for the default site.
    pub fn action_api_endpoint(&self, host: Option<&str>) -> Result<Endpoint> {
        Ok(Endpoint::from_url(&self.inner.config.action_api_url(host)?))
    }

    /// REST API endpoint for `path` on `host`, or on the default site.
    pub fn rest_api_endpoint(&self, host: Option<&str>, path: &str) -> Result<Endpoint> {
        Ok(Endpoint::from_url(&self.inner.config.rest_api_url(host, path)?))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Send `request` immediately on the caller's task.
    ///
    /// Does not take a queue permit; operations already running on the queue
    /// use this for their inner exchanges. Every response passes the status
    /// gate here exactly once.
    pub async fn execute(&self, request: Request, network: Network) -> Result<Response> {
        let transport = match network {
            Network::Default => &self.inner.default_transport,
            Network::Restricted => &self.inner.restricted_transport,
        };
        let response = transport.send(request).await?;
        self.handle_response(&response);
        Ok(response)
    }

    fn handle_response(&self, response: &Response) {
        match classify(response.status) {
            Disposition::PassThrough => {}
            Disposition::ForceLogout => self.force_logout(),
        }
    }

    fn force_logout(&self) {
        warn!("Server answered 401, logging out");
        self.remove_all_cookies();
        self.announce(SessionEvent::ForcedLogout);

        let hook = self.inner.logout_hook.read().clone();
        if let Some(hook) = hook {
            tokio::spawn(async move { hook.force_logout().await });
        }
    }

    /// Queue `request` and yield the raw response.
    pub fn data_task(&self, request: Request, network: Network) -> TaskHandle<Response> {
        let session = self.clone();
        self.inner
            .queue
            .spawn(async move { session.execute(request, network).await })
    }

    /// Queue `request` and decode the body as a JSON object.
    ///
    /// An empty or non-object body yields `None`.
    pub fn json_dictionary_task(
        &self,
        request: Request,
        network: Network,
    ) -> TaskHandle<Option<Map<String, Value>>> {
        let session = self.clone();
        self.inner.queue.spawn(async move {
            let response = session.execute(request, network).await?;
            Ok(decode_json_object(&response.body))
        })
    }

    /// Queue `request` and decode a `T` from a 200 response.
    pub fn json_decodable_task<T>(&self, request: Request, network: Network) -> TaskHandle<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let session = self.clone();
        self.inner.queue.spawn(async move {
            let response = session.execute(request, network).await?;
            decode_decodable(&response)
        })
    }

    /// Queue `request` and decode either a `T` or an error payload `E`.
    pub fn json_codable_task<T, E>(
        &self,
        request: Request,
        network: Network,
    ) -> TaskHandle<Decoded<T, E>>
    where
        T: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
    {
        let session = self.clone();
        self.inner.queue.spawn(async move {
            let response = session.execute(request, network).await?;
            decode_codable(&response)
        })
    }

    /// Queue a CSRF-guarded mutating request.
    pub fn request_with_csrf<T, E>(
        &self,
        template: RequestTemplate,
        context: TokenContext,
    ) -> CsrfHandle<T, E>
    where
        T: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
    {
        CsrfOperation::new(self.clone(), template, context).start()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication state
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether live central-auth cookies exist for the source domain.
    pub fn is_authenticated(&self) -> bool {
        let jar = &self.inner.jar;
        let central = &self.inner.config.central_auth;
        self.inner.auth.get_or_compute(jar.revision(), || {
            has_valid_central_auth_cookies(
                jar,
                &central.source_domain,
                &central.cookie_prefix,
                Utc::now(),
            )
        })
    }

    /// Copy central-auth cookies from the source domain to every target
    /// domain. Returns the number of cookies written.
    pub fn clone_central_auth_cookies(&self) -> usize {
        let central = &self.inner.config.central_auth;
        let copied = self.inner.jar.copy_cookies(
            &central.cookie_prefix,
            &central.source_domain,
            &central.target_domains,
        );
        self.inner.auth.invalidate();
        info!(
            copied,
            targets = central.target_domains.len(),
            "Cloned central-auth cookies"
        );
        self.announce(SessionEvent::CookiesChanged);
        copied
    }

    /// Delete every stored cookie and any cached tokens.
    pub fn remove_all_cookies(&self) {
        let removed = self.inner.jar.remove_all();
        self.inner.auth.invalidate();
        self.inner.token_fetcher.invalidate(None);
        info!(removed, "Removed all cookies");
        self.announce(SessionEvent::CookiesChanged);
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: Configuration,
    jar: Option<Arc<CookieJar>>,
    transport: Option<Arc<dyn Transport>>,
    restricted_transport: Option<Arc<dyn Transport>>,
    token_fetcher: Option<Arc<dyn TokenFetcher>>,
    user_agent: Option<String>,
}

impl SessionBuilder {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            jar: None,
            transport: None,
            restricted_transport: None,
            token_fetcher: None,
            user_agent: None,
        }
    }

    /// Share an existing cookie jar.
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Use a custom default transport. Unless a restricted transport is also
    /// given, it serves both networks.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom restricted-network transport.
    pub fn restricted_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.restricted_transport = Some(transport);
        self
    }

    /// Use a custom token source.
    pub fn token_fetcher(mut self, fetcher: Arc<dyn TokenFetcher>) -> Self {
        self.token_fetcher = Some(fetcher);
        self
    }

    /// Override the User-Agent header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the session.
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;

        let jar = self.jar.unwrap_or_default();
        let network = &self.config.network;
        let custom_transport = self.transport.is_some();

        let default_transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(
                jar.clone(),
                network.connect_timeout_secs.map(Duration::from_secs),
            )?),
        };

        let restricted_transport: Arc<dyn Transport> = match (self.restricted_transport, custom_transport) {
            (Some(t), _) => t,
            (None, true) => default_transport.clone(),
            (None, false) => Arc::new(HttpTransport::new(
                jar.clone(),
                network
                    .restricted_connect_timeout_secs
                    .or(network.connect_timeout_secs)
                    .map(Duration::from_secs),
            )?),
        };

        let user_agent = self.user_agent.unwrap_or_else(|| {
            format!(
                "{}/{} (quire-net; {})",
                self.config.site.user_agent_product,
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            )
        });
        HeaderValue::from_str(&user_agent)
            .map_err(|_| Error::Encode(format!("invalid user agent '{}'", user_agent)))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let queue = TaskQueue::new(network.max_concurrent_requests);

        debug!(
            user_agent = %user_agent,
            max_concurrent = queue.capacity(),
            "Session created"
        );

        Ok(Session {
            inner: Arc::new(SessionInner {
                token_fetcher: self
                    .token_fetcher
                    .unwrap_or_else(|| Arc::new(ApiTokenFetcher::new())),
                config: self.config,
                user_agent,
                jar,
                default_transport,
                restricted_transport,
                queue,
                auth: AuthStateCache::new(),
                events,
                logout_hook: RwLock::new(None),
            }),
        })
    }
}
