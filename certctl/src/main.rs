#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use tracing::{debug, Level};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

mod commands;

use commands::Command;

/// Certificate authority operator tool
#[derive(Parser, Debug)]
#[command(name = "certctl", version)]
#[command(about = "Issue, sign and inspect X.509 certificates")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; variables may come from the environment
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    debug!(command = ?cli.command, "Starting certctl");

    commands::run(cli.command).await
}

/// Human-readable logs on stderr, or JSON when `CERTCTL_LOG_FORMAT=json`
fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("certctl={level},cert_engine={level}").into());

    let json = env::var("CERTCTL_LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .context("Failed to install JSON log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}
