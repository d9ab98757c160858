//! Cached "is the user logged in" flag.
//!
//! Computing the flag walks the cookie jar, so the answer is cached together
//! with the jar revision it was computed from. Reads take a shared lock;
//! population and invalidation take the exclusive lock, so a reader never
//! observes a half-invalidated entry.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::trace;

use crate::cookies::CookieJar;

#[derive(Debug, Clone, Copy)]
struct CachedAuth {
    revision: u64,
    authenticated: bool,
}

/// Lazily computed authentication flag guarded by a read/write lock.
#[derive(Debug, Default)]
pub struct AuthStateCache {
    state: RwLock<Option<CachedAuth>>,
}

impl AuthStateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached flag for `revision`, computing it on a miss.
    pub fn get_or_compute(&self, revision: u64, compute: impl FnOnce() -> bool) -> bool {
        {
            let state = self.state.read();
            if let Some(cached) = *state
                && cached.revision == revision
            {
                return cached.authenticated;
            }
        }

        let mut state = self.state.write();
        // Another writer may have filled the entry while we waited.
        if let Some(cached) = *state
            && cached.revision == revision
        {
            return cached.authenticated;
        }

        let authenticated = compute();
        trace!(revision, authenticated, "Authentication flag recomputed");
        *state = Some(CachedAuth {
            revision,
            authenticated,
        });
        authenticated
    }

    /// Drop the cached flag.
    pub fn invalidate(&self) {
        *self.state.write() = None;
    }

    /// The cached flag, if one is present.
    pub fn cached(&self) -> Option<bool> {
        let state = *self.state.read();
        state.map(|c| c.authenticated)
    }
}

/// Whether `jar` holds live central-auth cookies for `domain`.
///
/// At least one cookie with `prefix` must exist and none of them may be
/// expired.
pub fn has_valid_central_auth_cookies(
    jar: &CookieJar,
    domain: &str,
    prefix: &str,
    now: DateTime<Utc>,
) -> bool {
    let cookies: Vec<_> = jar
        .cookies_for_domain(domain)
        .into_iter()
        .filter(|c| c.name.starts_with(prefix))
        .collect();

    !cookies.is_empty() && cookies.iter().all(|c| !c.is_expired_at(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::Cookie;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_computes_once_per_revision() {
        let cache = AuthStateCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        };

        assert!(cache.get_or_compute(1, compute));
        assert!(cache.get_or_compute(1, || unreachable!()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!cache.get_or_compute(2, || false));
        assert_eq!(cache.cached(), Some(false));
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let cache = AuthStateCache::new();
        cache.get_or_compute(7, || true);
        cache.invalidate();
        assert_eq!(cache.cached(), None);
        assert!(!cache.get_or_compute(7, || false));
    }

    #[test]
    fn test_concurrent_readers_agree() {
        let cache = Arc::new(AuthStateCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.get_or_compute(3, || true))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_central_auth_validity() {
        let jar = CookieJar::new();
        let now = Utc::now();
        assert!(!has_valid_central_auth_cookies(&jar, "wikipedia.org", "centralauth_", now));

        jar.insert(Cookie::new("enwikiSession", "x", "wikipedia.org"));
        assert!(!has_valid_central_auth_cookies(&jar, "wikipedia.org", "centralauth_", now));

        jar.insert(
            Cookie::new("centralauth_User", "Example", "wikipedia.org")
                .with_expires(now + chrono::Duration::days(30)),
        );
        assert!(has_valid_central_auth_cookies(&jar, "wikipedia.org", "centralauth_", now));

        // Evaluated at a time after expiry.
        let later = now + chrono::Duration::days(31);
        assert!(!has_valid_central_auth_cookies(&jar, "wikipedia.org", "centralauth_", later));
    }
}
