//! Cookie persistence between CLI runs.
//!
//! The session jar lives in memory; the CLI loads it from a JSON file before
//! building the session and writes it back after the command finishes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use quire_net::{Cookie, CookieJar};

/// Cookie filename within the config directory.
const COOKIE_FILE: &str = "cookies.json";

/// Default cookie file location, next to the user config.
pub fn default_path() -> Option<PathBuf> {
    quire_config::xdg_config_dir().map(|d| d.join(COOKIE_FILE))
}

/// Load a jar from `path`. A missing file yields an empty jar; expired
/// cookies are dropped.
pub fn load(path: &Path) -> Result<Arc<CookieJar>> {
    let jar = Arc::new(CookieJar::new());
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(jar),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let cookies: Vec<Cookie> = serde_json::from_str(&text)
        .with_context(|| format!("Malformed cookie file {}", path.display()))?;
    jar.insert_all(cookies);
    tracing::debug!(path = %path.display(), count = jar.len(), "Loaded cookies");
    Ok(jar)
}

/// Write every cookie in `jar` to `path`.
pub fn save(path: &Path, jar: &CookieJar) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(&jar.all())?;
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), count = jar.len(), "Saved cookies");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_file_is_empty_jar() {
        let dir = tempfile::tempdir().unwrap();
        let jar = load(&dir.path().join("cookies.json")).unwrap();
        assert!(jar.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cookies.json");

        let jar = CookieJar::new();
        jar.insert(Cookie::new("centralauth_User", "Reader", "wikipedia.org"));
        jar.insert(
            Cookie::new("enwikiSession", "s", "en.wikipedia.org")
                .with_expires(chrono_now_plus(Duration::from_secs(3600))),
        );
        save(&path, &jar).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.cookies_for_domain("wikipedia.org")[0].value, "Reader");
    }

    #[test]
    fn test_expired_cookies_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            r#"[{"name":"old","value":"x","domain":"wikipedia.org","path":"/",
                "expires":"2001-01-01T00:00:00Z","secure":false,"http_only":false,"host_only":false}]"#,
        )
        .unwrap();
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load(&path).is_err());
    }

    fn chrono_now_plus(d: Duration) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() + chrono::Duration::from_std(d).unwrap()
    }
}
