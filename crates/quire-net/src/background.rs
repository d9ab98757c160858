//! Background fetch coordination.
//!
//! Independent collaborators register themselves as [`BackgroundFetcher`]s.
//! When the host platform grants background time, the
//! [`BackgroundFetchCoordinator`] runs every live worker concurrently and
//! folds their results into one [`FetchResult`].
//!
//! The coordinator imposes no timeout: a worker that never finishes stalls
//! the whole fetch.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::request::{BodyEncoding, Endpoint, Method};
use crate::session::Session;
use crate::transport::Network;

/// Outcome of one background fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchResult {
    /// Nothing changed. The neutral element of [`combine`](Self::combine).
    #[default]
    NoData,
    NewData,
    Failed,
}

impl FetchResult {
    /// Fold two results: any failure wins, then any new data.
    pub fn combine(self, other: FetchResult) -> FetchResult {
        match (self, other) {
            (FetchResult::Failed, _) | (_, FetchResult::Failed) => FetchResult::Failed,
            (FetchResult::NewData, _) | (_, FetchResult::NewData) => FetchResult::NewData,
            _ => FetchResult::NoData,
        }
    }
}

impl FromIterator<FetchResult> for FetchResult {
    fn from_iter<I: IntoIterator<Item = FetchResult>>(iter: I) -> Self {
        iter.into_iter().fold(FetchResult::NoData, FetchResult::combine)
    }
}

/// A worker that refreshes some data in the background.
#[async_trait]
pub trait BackgroundFetcher: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "background-fetcher"
    }

    /// Run to completion and report one result.
    async fn perform_background_fetch(&self) -> FetchResult;
}

/// Observer of fetch lifecycles, e.g. telemetry.
pub trait FetchObserver: Send + Sync {
    fn on_fetch_will_start(&self, correlation_id: Uuid);
    fn on_fetch_did_end(&self, correlation_id: Uuid);
}

/// Fan-out/fan-in over registered background workers.
///
/// Workers are held by `Weak` reference; ownership stays with whoever
/// registered them, and a dropped worker is skipped and pruned.
#[derive(Default)]
pub struct BackgroundFetchCoordinator {
    fetchers: Mutex<Vec<Weak<dyn BackgroundFetcher>>>,
    observer: Option<Arc<dyn FetchObserver>>,
}

impl BackgroundFetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Register a worker without taking ownership of it.
    pub fn register<F: BackgroundFetcher + 'static>(&self, fetcher: &Arc<F>) {
        let weak: Weak<dyn BackgroundFetcher> = Arc::downgrade(fetcher) as Weak<dyn BackgroundFetcher>;
        self.fetchers.lock().push(weak);
        debug!(name = fetcher.name(), "Registered background fetcher");
    }

    /// Number of registered workers that are still alive.
    pub fn live_count(&self) -> usize {
        self.fetchers
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn live_fetchers(&self) -> Vec<Arc<dyn BackgroundFetcher>> {
        let mut fetchers = self.fetchers.lock();
        fetchers.retain(|w| w.strong_count() > 0);
        fetchers.iter().filter_map(Weak::upgrade).collect()
    }

    /// Run every live worker concurrently and combine their results.
    ///
    /// A worker that panics counts as [`FetchResult::Failed`].
    pub async fn perform_background_fetch(&self) -> FetchResult {
        let correlation_id = Uuid::new_v4();
        if let Some(observer) = &self.observer {
            observer.on_fetch_will_start(correlation_id);
        }

        let fetchers = self.live_fetchers();
        info!(%correlation_id, workers = fetchers.len(), "Background fetch started");

        let handles: Vec<_> = fetchers
            .into_iter()
            .map(|fetcher| tokio::spawn(async move { fetcher.perform_background_fetch().await }))
            .collect();

        let combined: FetchResult = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    warn!(%correlation_id, error = %e, "Background fetcher aborted");
                    FetchResult::Failed
                })
            })
            .collect();

        info!(%correlation_id, result = ?combined, "Background fetch finished");
        if let Some(observer) = &self.observer {
            observer.on_fetch_did_end(correlation_id);
        }
        combined
    }
}

/// Polls a URL and reports whether its content changed since the last poll.
///
/// The fingerprint is the `ETag` header when present, otherwise a hash of the
/// body. The first successful poll always counts as new data.
pub struct ChangeFetcher {
    session: Session,
    url: Url,
    name: String,
    network: Network,
    last_fingerprint: Mutex<Option<String>>,
}

impl ChangeFetcher {
    pub fn new(session: Session, url: Url) -> Self {
        Self {
            name: url.to_string(),
            session,
            url,
            network: Network::Default,
            last_fingerprint: Mutex::new(None),
        }
    }

    /// Poll over the restricted-network client instead.
    pub fn on_restricted_network(mut self) -> Self {
        self.network = Network::Restricted;
        self
    }

    fn fingerprint(response: &crate::response::Response) -> String {
        if let Some(etag) = response.header("etag") {
            return etag.to_string();
        }
        let mut hasher = DefaultHasher::new();
        response.body.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[async_trait]
impl BackgroundFetcher for ChangeFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform_background_fetch(&self) -> FetchResult {
        let request = match self.session.request(
            &Endpoint::from_url(&self.url),
            Method::Get,
            None,
            BodyEncoding::Json,
        ) {
            Ok(request) => request,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Cannot build poll request");
                return FetchResult::Failed;
            }
        };

        let response = match self.session.data_task(request, self.network).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Poll failed");
                return FetchResult::Failed;
            }
        };
        if !response.is_success() {
            warn!(url = %self.url, status = response.status, "Poll returned error status");
            return FetchResult::Failed;
        }

        let fingerprint = Self::fingerprint(&response);
        let mut last = self.last_fingerprint.lock();
        if last.as_deref() == Some(fingerprint.as_str()) {
            FetchResult::NoData
        } else {
            *last = Some(fingerprint);
            FetchResult::NewData
        }
    }
}
