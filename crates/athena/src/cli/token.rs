//! The `athena token` command: check that credentials can be exchanged.
//!
//! The token value itself is never printed.

use athena_core::{AccessToken, Config, CredentialCache};
use clap::Args;
use serde::Serialize;

/// Arguments for the `token` command.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TokenReport {
    scheme: String,
    expires_in_secs: u64,
    refresh_margin_secs: u64,
}

impl TokenReport {
    fn new(token: &AccessToken, cache: &CredentialCache) -> Self {
        Self {
            scheme: token.scheme().to_string(),
            expires_in_secs: token.remaining().as_secs(),
            refresh_margin_secs: cache.refresh_margin().as_secs(),
        }
    }
}

/// Execute the token command.
pub async fn execute(args: TokenArgs, config: Config) -> anyhow::Result<()> {
    let report = acquire(&config).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Token acquired: {} scheme, expires in {}s (refreshed {}s early)",
            report.scheme, report.expires_in_secs, report.refresh_margin_secs
        );
    }
    Ok(())
}

async fn acquire(config: &Config) -> anyhow::Result<TokenReport> {
    let cache = CredentialCache::from_config(&config.auth)?;
    tracing::info!("Requesting access token from {}", config.auth.auth_url);

    let token = cache.get_token().await?;
    Ok(TokenReport::new(&token, &cache))
}
