//! Status command - shows the session configuration and login state.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also list the central-auth target domains
    #[arg(short, long)]
    pub detailed: bool,
}

#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    authenticated: bool,
    default_domain: &'a str,
    user_agent: &'a str,
    max_concurrent_requests: usize,
    cookies: usize,
    config_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_domains: Option<&'a [String]>,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let session = &ctx.session;
    let config = session.config();
    let output = StatusOutput {
        authenticated: session.is_authenticated(),
        default_domain: &config.site.default_domain,
        user_agent: session.user_agent(),
        max_concurrent_requests: session.queue().capacity(),
        cookies: session.cookie_jar().len(),
        config_file: ctx
            .config_source
            .as_ref()
            .map(|p| p.display().to_string()),
        target_domains: args
            .detailed
            .then_some(config.central_auth.target_domains.as_slice()),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("Quire Session Status");
    println!("{}", "─".repeat(40));
    println!(
        "  Logged in:    {}",
        if output.authenticated { "yes" } else { "no" }
    );
    println!("  Site:         {}", output.default_domain);
    println!("  User agent:   {}", output.user_agent);
    println!("  Concurrency:  {}", output.max_concurrent_requests);
    println!("  Cookies:      {}", output.cookies);
    println!(
        "  Config:       {}",
        output.config_file.as_deref().unwrap_or("(defaults)")
    );
    if let Some(targets) = output.target_domains {
        println!("  Auth targets: {}", targets.join(", "));
    }
    println!();
    Ok(())
}
