//! Config file discovery.
//!
//! Resolution order:
//! 1. An explicit path (e.g. `--config`)
//! 2. `$QUIRE_CONFIG_DIR/config.toml`, else the platform config dir
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use crate::{ConfigError, Configuration, Result};

/// Default config filename within the config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "quire";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "QUIRE_CONFIG_DIR";

/// Result of config discovery.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The configuration in effect.
    pub config: Configuration,
    /// File the configuration came from, `None` for built-in defaults.
    pub source: Option<PathBuf>,
}

/// Load configuration from `explicit`, or discover the user config file.
///
/// An explicit path must exist; a missing discovered file falls back to
/// defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            config: load_config_file(path)?,
            source: Some(path.to_path_buf()),
        });
    }

    match xdg_config_path() {
        Some(path) if path.is_file() => Ok(LoadedConfig {
            config: load_config_file(&path)?,
            source: Some(path),
        }),
        _ => Ok(LoadedConfig {
            config: Configuration::default(),
            source: None,
        }),
    }
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<Configuration> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Configuration::from_toml(&contents)
}

/// Save configuration to a file, creating parent directories.
pub fn save_config(config: &Configuration, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Config directory: `QUIRE_CONFIG_DIR` if set, else the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quire.toml");
        std::fs::write(
            &path,
            r#"
            [site]
            default_domain = "wiki.example.org"
            "#,
        )
        .unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.site.default_domain, "wiki.example.org");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Configuration::default();
        config.central_auth.target_domains = vec!["wikidata.org".to_string()];
        save_config(&config, &path).unwrap();

        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
