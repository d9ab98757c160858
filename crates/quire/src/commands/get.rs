//! Get command - fetches a JSON document through the session.

use anyhow::{Context as _, Result, bail};
use clap::Args;
use quire_net::{BodyEncoding, Method, Network};

use super::Context;

/// Arguments for the get command.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Wiki host, e.g. en.wikipedia.org
    pub host: String,

    /// Path below the REST API root, e.g. page/summary/Rust
    #[arg(default_value = "")]
    pub path: String,

    /// Query the action API instead; PATH is ignored
    #[arg(long)]
    pub action: bool,

    /// Extra query items as key=value
    #[arg(short, long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Use the restricted-network client
    #[arg(long)]
    pub restricted: bool,
}

fn parse_query(items: &[String]) -> Result<Vec<(String, String)>> {
    items
        .iter()
        .map(|item| match item.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => bail!("query item '{}' is not KEY=VALUE", item),
        })
        .collect()
}

/// Run the get command.
pub async fn run(args: GetArgs, ctx: &Context) -> Result<()> {
    let session = &ctx.session;
    let endpoint = if args.action {
        session.action_api_endpoint(Some(&args.host))?
    } else {
        session.rest_api_endpoint(Some(&args.host), &args.path)?
    }
    .with_query_items(parse_query(&args.query)?);

    let network = if args.restricted {
        Network::Restricted
    } else {
        Network::Default
    };

    let request = session.request(&endpoint, Method::Get, None, BodyEncoding::Json)?;
    tracing::info!(url = %request.url, "Fetching");

    let document = session
        .json_dictionary_task(request, network)
        .await
        .with_context(|| format!("Request to {} failed", args.host))?;

    match document {
        Some(object) => {
            println!("{}", serde_json::to_string_pretty(&object)?);
            Ok(())
        }
        None => bail!("Response was not a JSON object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let items = vec!["action=query".to_string(), "titles=A=B".to_string()];
        assert_eq!(
            parse_query(&items).unwrap(),
            vec![
                ("action".to_string(), "query".to_string()),
                ("titles".to_string(), "A=B".to_string()),
            ]
        );
        assert!(parse_query(&["novalue".to_string()]).is_err());
        assert!(parse_query(&["=x".to_string()]).is_err());
    }
}
