//! Transports carry a built [`Request`] to the network and back.
//!
//! The session never talks to `reqwest` directly; it holds two
//! `Arc<dyn Transport>` values so tests can swap in an in-process fake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cookies::CookieJar;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// Which client a request is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// The general-purpose client.
    #[default]
    Default,
    /// The client reserved for traffic that must not use constrained or
    /// metered links, such as bulk background downloads.
    Restricted,
}

/// Sends requests and returns raw responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP exchange.
    async fn send(&self, request: Request) -> Result<Response>;
}

/// `reqwest`-backed transport sharing the session cookie jar.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client that reads and writes cookies through `jar`.
    ///
    /// `connect_timeout` is the only timeout applied; requests themselves
    /// are not bounded.
    pub fn new(jar: Arc<CookieJar>, connect_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().cookie_provider(jar);
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        debug!(method = ?request.method, url = %request.url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(status, bytes = body.len(), "Response received");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
