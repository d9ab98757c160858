//! Quire - command line front end for the reader networking core.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use quire_net::Session;

mod commands;
mod cookie_file;

use commands::{background, cookies, get, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Quire - encyclopedia reader networking core
#[derive(Parser)]
#[command(name = "quire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a config file (default: platform config dir)
    #[arg(long, global = true, env = "QUIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cookie file (default: cookies.json in the config dir)
    #[arg(long, global = true, env = "QUIRE_COOKIE_FILE")]
    pub cookie_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show session configuration and login state
    Status(status::StatusArgs),

    /// Fetch a JSON document from a wiki
    Get(get::GetArgs),

    /// Poll URLs once through the background fetch coordinator
    BackgroundFetch(background::BackgroundFetchArgs),

    /// Delete every stored cookie
    ClearCookies,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = quire_config::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let filter = if cli.verbose {
        "quire=debug,quire_net=debug,quire_config=debug,info"
    } else {
        "quire=info,quire_net=info,warn"
    };

    use tracing_subscriber::prelude::*;
    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new(filter));

    // The guard must outlive every command so buffered lines are flushed.
    let _guard = match loaded.config.logging.as_ref().and_then(|l| l.directory.clone()) {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, "quire.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_filter(tracing_subscriber::EnvFilter::new(
                            "quire=trace,quire_net=trace,quire_config=trace,info",
                        )),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(console).init();
            None
        }
    };

    tracing::debug!(source = ?loaded.source, "Configuration loaded");

    let cookie_path = cli.cookie_file.or_else(cookie_file::default_path);
    let mut builder = Session::builder(loaded.config.clone());
    if let Some(path) = &cookie_path {
        builder = builder.cookie_jar(cookie_file::load(path)?);
    }
    let session = builder.build().context("Failed to create session")?;
    let ctx = commands::Context {
        session,
        config_source: loaded.source,
        json_output: cli.json,
    };

    let outcome = match cli.command {
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Get(args) => get::run(args, &ctx).await,
        Commands::BackgroundFetch(args) => background::run(args, &ctx).await,
        Commands::ClearCookies => cookies::clear(&ctx),
    };

    // Server-set cookies and forced logouts survive into the next run.
    if let Some(path) = &cookie_path {
        cookie_file::save(path, ctx.session.cookie_jar())?;
    }
    outcome
}
