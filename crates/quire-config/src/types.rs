//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [site]
//! default_domain = "wikipedia.org"
//!
//! [[site.host_rules]]
//! host = "test.wikipedia.org"
//! action_path = "/w/api.php"
//!
//! [central_auth]
//! source_domain = "wikipedia.org"
//! target_domains = ["wikidata.org", "mediawiki.org"]
//!
//! [network]
//! max_concurrent_requests = 16
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// Default number of in-flight requests the session allows.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Name prefix shared by every central-auth cookie.
pub const CENTRAL_AUTH_COOKIE_PREFIX: &str = "centralauth_";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable description of the wiki family a session talks to.
///
/// All sections carry defaults so a partial file only has to name what it
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Hosts, schemes and API paths.
    pub site: SiteConfig,

    /// Central-auth cookie policy.
    pub central_auth: CentralAuthConfig,

    /// Transport and task queue settings.
    pub network: NetworkConfig,

    /// Log output settings for the command line front end.
    pub logging: Option<LoggingConfig>,
}

impl Configuration {
    /// Parse from a TOML string and validate the result.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Configuration = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the session cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.site.default_domain.trim().is_empty() {
            return Err(ConfigError::invalid("site.default_domain", "must not be empty"));
        }
        if !matches!(self.site.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::invalid(
                "site.scheme",
                format!("unsupported scheme '{}'", self.site.scheme),
            ));
        }
        if self.central_auth.source_domain.trim().is_empty() {
            return Err(ConfigError::invalid(
                "central_auth.source_domain",
                "must not be empty",
            ));
        }
        if self.network.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid(
                "network.max_concurrent_requests",
                "must be at least 1",
            ));
        }
        for rule in &self.site.host_rules {
            for path in [&rule.action_path, &rule.rest_path].into_iter().flatten() {
                if !path.starts_with('/') {
                    return Err(ConfigError::invalid(
                        &format!("site.host_rules[{}]", rule.host),
                        format!("path '{}' must start with '/'", path),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Action API path for a host, honoring per-host rules.
    pub fn action_api_path(&self, host: &str) -> &str {
        self.site
            .rule_for(host)
            .and_then(|r| r.action_path.as_deref())
            .unwrap_or(&self.site.action_path)
    }

    /// REST API path for a host, honoring per-host rules.
    pub fn rest_api_path(&self, host: &str) -> &str {
        self.site
            .rule_for(host)
            .and_then(|r| r.rest_path.as_deref())
            .unwrap_or(&self.site.rest_path)
    }

    /// Build the action API endpoint URL for `host`.
    ///
    /// `None` falls back to the default site domain.
    pub fn action_api_url(&self, host: Option<&str>) -> Result<Url> {
        let host = host.unwrap_or(&self.site.default_domain);
        self.url_for(host, self.action_api_path(host))
    }

    /// Build a REST API URL for `host` with `path` appended.
    pub fn rest_api_url(&self, host: Option<&str>, path: &str) -> Result<Url> {
        let host = host.unwrap_or(&self.site.default_domain);
        let base = self.rest_api_path(host).trim_end_matches('/');
        let full = format!("{}/{}", base, path.trim_start_matches('/'));
        self.url_for(host, &full)
    }

    fn url_for(&self, host: &str, path: &str) -> Result<Url> {
        let raw = format!("{}://{}{}", self.site.scheme, host, path);
        Url::parse(&raw).map_err(|e| ConfigError::invalid("host", format!("{}: {}", raw, e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Site
// ─────────────────────────────────────────────────────────────────────────────

/// Where the wiki lives and how its APIs are addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Domain used when a caller does not name a host.
    pub default_domain: String,

    /// URL scheme for every API request.
    pub scheme: String,

    /// Default action API path.
    pub action_path: String,

    /// Default REST API path.
    pub rest_path: String,

    /// Per-host path overrides.
    pub host_rules: Vec<HostRule>,

    /// Product token placed at the front of the User-Agent header.
    pub user_agent_product: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            default_domain: "wikipedia.org".to_string(),
            scheme: "https".to_string(),
            action_path: "/w/api.php".to_string(),
            rest_path: "/api/rest_v1".to_string(),
            host_rules: Vec::new(),
            user_agent_product: "Quire".to_string(),
        }
    }
}

impl SiteConfig {
    fn rule_for(&self, host: &str) -> Option<&HostRule> {
        self.host_rules
            .iter()
            .find(|r| r.host.eq_ignore_ascii_case(host))
    }
}

/// API path override for a single host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRule {
    /// Exact host name the rule applies to.
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_path: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Central auth
// ─────────────────────────────────────────────────────────────────────────────

/// Which cookies represent the logged-in identity and where they are copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralAuthConfig {
    /// Cookie name prefix identifying central-auth cookies.
    pub cookie_prefix: String,

    /// Domain whose cookies are authoritative.
    pub source_domain: String,

    /// Sibling domains that receive copies of the central-auth cookies.
    pub target_domains: Vec<String>,
}

impl Default for CentralAuthConfig {
    fn default() -> Self {
        Self {
            cookie_prefix: CENTRAL_AUTH_COOKIE_PREFIX.to_string(),
            source_domain: "wikipedia.org".to_string(),
            target_domains: vec![
                "wikidata.org".to_string(),
                "mediawiki.org".to_string(),
                "wikimedia.org".to_string(),
                "wikifunctions.org".to_string(),
            ],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────────────────────────────────────

/// Transport and queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Upper bound on concurrently executing requests.
    pub max_concurrent_requests: usize,

    /// Connect timeout handed to the HTTP client. The session itself imposes
    /// no request timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    /// Connect timeout for the restricted-network client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted_connect_timeout_secs: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            connect_timeout_secs: None,
            restricted_connect_timeout_secs: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log file settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the rolling JSON log. Unset means console only.
    pub directory: Option<PathBuf>,
}
