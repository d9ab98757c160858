//! Raw responses and the status gate every response passes through.

use bytes::Bytes;
use reqwest::header::HeaderMap;

/// HTTP status that revokes the current login.
pub const UNAUTHORIZED: u16 = 401;

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Create a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// What the session must do with a response before decoding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the response to the caller unchanged.
    PassThrough,
    /// Log the user out, then hand the response to the caller unchanged.
    ForceLogout,
}

/// Classify a response by status alone.
pub fn classify(status: u16) -> Disposition {
    if status == UNAUTHORIZED {
        Disposition::ForceLogout
    } else {
        Disposition::PassThrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_401_forces_logout() {
        assert_eq!(classify(401), Disposition::ForceLogout);
        for status in [200, 201, 204, 302, 400, 403, 404, 500, 503] {
            assert_eq!(classify(status), Disposition::PassThrough, "status {}", status);
        }
    }

    #[test]
    fn test_success_range() {
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(304, "").is_success());
    }
}
