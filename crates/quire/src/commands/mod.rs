//! CLI command handlers.

pub mod background;
pub mod cookies;
pub mod get;
pub mod status;

use std::path::PathBuf;

use quire_net::Session;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Session every command talks through.
    pub session: Session,
    /// Config file in effect, `None` for built-in defaults.
    pub config_source: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
}
