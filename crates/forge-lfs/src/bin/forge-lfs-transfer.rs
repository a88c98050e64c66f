//! `forge-lfs-transfer <repo> <upload|download>`
//!
//! Invoked by the SSH command handler. stdout carries the protocol, so logs
//! go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use forge_lfs::{
    ClientConfig, HttpLockBackend, HttpTransferBackend, InternalClient, Operation, Processor,
};
use tracing::info;
use url::Url;

#[derive(Parser)]
#[command(name = "forge-lfs-transfer")]
#[command(about = "Serve git-lfs-transfer requests against the forge's internal LFS API")]
#[command(version)]
struct Cli {
    /// Repository as owner/name
    repo: String,

    /// Transfer direction: upload or download
    operation: String,

    /// Base URL of the internal repository API
    #[arg(long, env = "FORGE_LFS_SERVER_URL")]
    server_url: Url,

    /// Authorization header value for the pushing or pulling user
    #[arg(long, env = "FORGE_LFS_TOKEN", hide_env_values = true)]
    token: String,

    /// Internal API token
    #[arg(long, env = "FORGE_INTERNAL_TOKEN", hide_env_values = true)]
    internal_token: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "FORGE_LFS_TIMEOUT", default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let operation: Operation = cli
        .operation
        .parse()
        .with_context(|| format!("unsupported operation {:?}", cli.operation))?;

    let config = ClientConfig::new(cli.server_url, &cli.repo)
        .with_auth_token(cli.token)
        .with_internal_token(cli.internal_token)
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    let client = InternalClient::new(&config).context("failed to build LFS API client")?;
    info!(repo = %cli.repo, %operation, base = %client.base(), "starting lfs transfer");

    Processor::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        operation,
        Arc::new(HttpTransferBackend::new(client.clone())),
        Arc::new(HttpLockBackend::new(client)),
    )
    .run()
    .await
    .context("lfs transfer failed")
}
