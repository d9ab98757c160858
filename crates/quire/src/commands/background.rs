//! Background fetch command - polls URLs through the coordinator.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use quire_net::{BackgroundFetchCoordinator, ChangeFetcher, FetchResult};
use serde_json::json;
use url::Url;

use super::Context;

/// Arguments for the background-fetch command.
#[derive(Args, Debug)]
pub struct BackgroundFetchArgs {
    /// URLs to poll
    #[arg(required = true)]
    pub urls: Vec<Url>,

    /// Poll on the restricted-network client
    #[arg(long)]
    pub restricted: bool,
}

/// Run the background-fetch command.
pub async fn run(args: BackgroundFetchArgs, ctx: &Context) -> Result<()> {
    let coordinator = BackgroundFetchCoordinator::new();

    // Workers are weakly held; keep them alive for the duration of the fetch.
    let workers: Vec<Arc<ChangeFetcher>> = args
        .urls
        .into_iter()
        .map(|url| {
            let fetcher = ChangeFetcher::new(ctx.session.clone(), url);
            Arc::new(if args.restricted {
                fetcher.on_restricted_network()
            } else {
                fetcher
            })
        })
        .collect();
    for worker in &workers {
        coordinator.register(worker);
    }

    let result = coordinator.perform_background_fetch().await;
    let label = match result {
        FetchResult::NoData => "no-data",
        FetchResult::NewData => "new-data",
        FetchResult::Failed => "failed",
    };

    if ctx.json_output {
        println!("{}", json!({ "result": label, "workers": workers.len() }));
    } else {
        println!("Background fetch: {} ({} workers)", label, workers.len());
    }

    if result == FetchResult::Failed {
        bail!("At least one background fetch failed");
    }
    Ok(())
}
