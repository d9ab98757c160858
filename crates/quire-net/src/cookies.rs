//! Host-scoped cookie storage shared by every client of a session.
//!
//! [`CookieJar`] is installed as the `reqwest` cookie provider, so cookies
//! set by the server land here without extra plumbing. Every mutation bumps
//! a revision counter that the authentication cache keys on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

/// A stored cookie.
///
/// `domain` is kept lowercase without a leading dot. Cookie values are
/// credentials and are redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
    /// Set when the server omitted the Domain attribute; the cookie then only
    /// matches the exact host.
    pub host_only: bool,
}

impl Cookie {
    /// Create a session cookie valid for `domain` and its subdomains.
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: &str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(domain),
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: false,
            host_only: false,
        }
    }

    /// Set an expiry time.
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Parse a `Set-Cookie` header value received from `url`.
    pub fn parse_set_cookie(header: &str, url: &Url) -> Option<Self> {
        let parsed = cookie::Cookie::parse(header.to_string()).ok()?;
        let host = url.host_str()?;

        let (domain, host_only) = match parsed.domain() {
            Some(d) if !d.trim_matches('.').is_empty() => (normalize_domain(d), false),
            _ => (normalize_domain(host), true),
        };

        // Max-Age wins over Expires.
        let now = Utc::now();
        let expires = match parsed.max_age() {
            Some(age) => Some(expiry_after(now, age.whole_seconds())),
            None => parsed
                .expires_datetime()
                .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), 0))
                .map(|t| t.min(expiry_after(now, MAX_LIFETIME_SECS))),
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(url),
        };

        Some(Self {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            expires,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only,
        })
    }

    /// Whether the cookie has expired at `now`. Session cookies never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|e| e <= now)
    }

    /// Whether the cookie would be sent to `host`.
    pub fn matches_domain(&self, host: &str) -> bool {
        let host = normalize_domain(host);
        if host == self.domain {
            return true;
        }
        !self.host_only && host.ends_with(&format!(".{}", self.domain))
    }

    fn matches_path(&self, path: &str) -> bool {
        if path == self.path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/'))
    }

    fn same_identity(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

/// Longest lifetime a server may give a cookie: 400 days, per RFC 6265bis.
const MAX_LIFETIME_SECS: i64 = 400 * 24 * 60 * 60;

/// `now + seconds`, capped at [`MAX_LIFETIME_SECS`]. Out-of-range negative
/// values expire immediately.
fn expiry_after(now: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    chrono::Duration::try_seconds(seconds.min(MAX_LIFETIME_SECS))
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now)
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expires", &self.expires)
            .field("secure", &self.secure)
            .field("host_only", &self.host_only)
            .finish()
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

/// Thread-safe cookie store.
#[derive(Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<Cookie>>,
    revision: AtomicU64,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter bumped after every mutation.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Number of stored cookies.
    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    /// Whether the jar holds no cookies.
    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }

    /// Store a cookie, replacing any cookie with the same name, domain and path.
    pub fn insert(&self, cookie: Cookie) {
        self.insert_all(std::iter::once(cookie));
    }

    /// Store several cookies under a single revision bump.
    pub fn insert_all(&self, cookies: impl IntoIterator<Item = Cookie>) {
        let now = Utc::now();
        let mut store = self.cookies.write();
        for cookie in cookies {
            store.retain(|c| !c.same_identity(&cookie));
            // An already expired cookie is a deletion request.
            if !cookie.is_expired_at(now) {
                store.push(cookie);
            }
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot of every stored cookie.
    pub fn all(&self) -> Vec<Cookie> {
        self.cookies.read().clone()
    }

    /// Cookies that would be sent to `domain`, expired ones included.
    pub fn cookies_for_domain(&self, domain: &str) -> Vec<Cookie> {
        self.cookies
            .read()
            .iter()
            .filter(|c| c.matches_domain(domain))
            .cloned()
            .collect()
    }

    /// Live cookies applicable to a request for `url`.
    pub fn cookies_for_url(&self, url: &Url) -> Vec<Cookie> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        let now = Utc::now();
        let https = url.scheme() == "https";
        self.cookies
            .read()
            .iter()
            .filter(|c| c.matches_domain(host))
            .filter(|c| c.matches_path(url.path()))
            .filter(|c| https || !c.secure)
            .filter(|c| !c.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Remove every cookie. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let mut store = self.cookies.write();
        let removed = store.len();
        store.clear();
        self.revision.fetch_add(1, Ordering::SeqCst);
        removed
    }

    /// Copy cookies whose name starts with `prefix` from `source_domain` to
    /// each of `target_domains`. Returns the number of copies written.
    pub fn copy_cookies(&self, prefix: &str, source_domain: &str, target_domains: &[String]) -> usize {
        let source = normalize_domain(source_domain);
        let mut store = self.cookies.write();

        let originals: Vec<Cookie> = store
            .iter()
            .filter(|c| c.domain == source && c.name.starts_with(prefix))
            .cloned()
            .collect();

        let mut copied = 0;
        for target in target_domains {
            let target = normalize_domain(target);
            if target == source {
                continue;
            }
            for original in &originals {
                let copy = Cookie {
                    domain: target.clone(),
                    host_only: false,
                    ..original.clone()
                };
                store.retain(|c| !c.same_identity(&copy));
                store.push(copy);
                copied += 1;
            }
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
        copied
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("len", &self.len())
            .field("revision", &self.revision())
            .finish()
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let parsed: Vec<Cookie> = cookie_headers
            .filter_map(|h| h.to_str().ok())
            .filter_map(|h| Cookie::parse_set_cookie(h, url))
            .collect();

        if parsed.is_empty() {
            return;
        }
        debug!(host = ?url.host_str(), count = parsed.len(), "Storing cookies from response");
        self.insert_all(parsed);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        trace!(host = ?url.host_str(), count = cookies.len(), "Attaching cookies");
        let header = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}
