//! Site configuration for the Quire reader.
//!
//! A [`Configuration`] names the wiki family the session talks to: the
//! default site domain, per-host API paths, the central-auth cookie policy,
//! and network limits. It is loaded once at startup and never mutated.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
