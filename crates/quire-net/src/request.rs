//! Request building.
//!
//! [`build_request`] turns endpoint components, a method, an optional body
//! and a body encoding into a fully formed [`Request`]. It has no side
//! effects; the only failure besides body encoding is an endpoint that does
//! not form a valid URL.

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};

/// Content type for JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type for form bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP methods the session issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Whether requests with this method change server state.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// How a request body is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    #[default]
    Json,
    Form,
}

impl BodyEncoding {
    /// `Content-Type` header value for this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            BodyEncoding::Json => JSON_CONTENT_TYPE,
            BodyEncoding::Form => FORM_CONTENT_TYPE,
        }
    }
}

/// Components of a target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Endpoint {
    /// Create an endpoint from its parts.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port: None,
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// HTTPS endpoint on the default port.
    pub fn https(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new("https", host, path)
    }

    /// Decompose an existing URL.
    pub fn from_url(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port(),
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// Set an explicit port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Append a query item.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append several query items.
    pub fn with_query_items<K, V>(mut self, items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(items.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Assemble the URL.
    pub fn to_url(&self) -> Result<Url> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidUrl("endpoint has no host".to_string()));
        }

        let authority = match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };
        let mut url = Url::parse(&format!("{}://{}", self.scheme, authority))?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!(
                "'{}' cannot carry a path",
                url
            )));
        }
        // Only a bare host may appear in `host`.
        let smuggled = url.path() != "/"
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
            || url.password().is_some()
            || (self.port.is_none() && url.port().is_some());
        if smuggled {
            return Err(Error::InvalidUrl(format!(
                "'{}' is not a bare host",
                self.host
            )));
        }
        url.set_path(&self.path);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

/// A fully formed HTTP request ready for a transport.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Query items of the target URL.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Body parsed as form pairs, when the body is form encoded.
    pub fn form_pairs(&self) -> Option<Vec<(String, String)>> {
        if self.header(CONTENT_TYPE.as_str()) != Some(FORM_CONTENT_TYPE) {
            return None;
        }
        let body = self.body.as_ref()?;
        Some(
            url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    /// Body parsed as JSON, when the body is JSON encoded.
    pub fn json_body(&self) -> Option<Value> {
        if self.header(CONTENT_TYPE.as_str()) != Some(JSON_CONTENT_TYPE) {
            return None;
        }
        serde_json::from_slice(self.body.as_ref()?).ok()
    }
}

/// Build a request.
///
/// `Accept: application/json` and the user agent are always set; a body adds
/// the matching `Content-Type`.
pub fn build_request(
    endpoint: &Endpoint,
    method: Method,
    body: Option<&Map<String, Value>>,
    encoding: BodyEncoding,
    user_agent: &str,
) -> Result<Request> {
    let url = endpoint.to_url()?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|_| Error::Encode(format!("invalid user agent '{}'", user_agent)))?,
    );

    let body = match body {
        Some(body) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(encoding.content_type()));
            Some(encode_body(body, encoding)?)
        }
        None => None,
    };

    Ok(Request {
        method,
        url,
        headers,
        body,
    })
}

/// Serialize a body with the given encoding.
pub fn encode_body(body: &Map<String, Value>, encoding: BodyEncoding) -> Result<Bytes> {
    match encoding {
        BodyEncoding::Json => serde_json::to_vec(body)
            .map(Bytes::from)
            .map_err(|e| Error::Encode(e.to_string())),
        BodyEncoding::Form => {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in body {
                serializer.append_pair(key, &form_value(value));
            }
            Ok(Bytes::from(serializer.finish()))
        }
    }
}

/// Flatten a JSON value into a form field.
///
/// Lists are pipe-joined, the multi-value convention of the wiki action API.
fn form_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(form_value).collect::<Vec<_>>().join("|"),
        Value::Object(_) => value.to_string(),
    }
}

/// A request whose token-bearing parts are still open for modification.
///
/// The CSRF pipeline injects its token into `endpoint.query` or `body`
/// before building.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub endpoint: Endpoint,
    pub method: Method,
    pub body: Option<Map<String, Value>>,
    pub encoding: BodyEncoding,
}

impl RequestTemplate {
    /// Create a template without a body.
    pub fn new(endpoint: Endpoint, method: Method) -> Self {
        Self {
            endpoint,
            method,
            body: None,
            encoding: BodyEncoding::default(),
        }
    }

    /// Form-encoded POST, the usual shape of an action API write.
    pub fn form_post(endpoint: Endpoint, body: Map<String, Value>) -> Self {
        Self {
            endpoint,
            method: Method::Post,
            body: Some(body),
            encoding: BodyEncoding::Form,
        }
    }

    /// Attach a body.
    pub fn with_body(mut self, body: Map<String, Value>, encoding: BodyEncoding) -> Self {
        self.body = Some(body);
        self.encoding = encoding;
        self
    }

    /// Build the request.
    pub fn build(&self, user_agent: &str) -> Result<Request> {
        build_request(
            &self.endpoint,
            self.method,
            self.body.as_ref(),
            self.encoding,
            user_agent,
        )
    }
}
