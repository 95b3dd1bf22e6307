//! Command-line client for the stockroom inventory backend.
//!
//! Each invocation restores the session from the configured file, runs one
//! command, and leaves the session on disk for the next invocation.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use cli::Cli;
use config::ClientConfig;
use error::CliError;
use rootcause::prelude::Report;
use std::process::ExitCode;
use std::sync::Arc;
use stockroom_core::{FileStore, SessionVault};
use stockroom_gateway::GatewayClient;
use stockroom_session::SessionStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn open_session(config: &ClientConfig) -> Result<SessionStore, Report<CliError>> {
    let vault = SessionVault::new(Arc::new(FileStore::new(config.storage.path.clone())));

    let gateway = GatewayClient::new(&config.api, vault).map_err(|e| {
        let details = e.current_context().to_string();
        e.context(CliError::Setup { details })
    })?;

    SessionStore::new(gateway).map_err(|e| {
        let details = e.current_context().to_string();
        e.context(CliError::Setup { details })
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", CliError::Config { details: e.to_string() });
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(
        base_url = config.api.base_url(),
        storage = %config.storage.path.display(),
        "loaded configuration"
    );

    let result = match open_session(&config) {
        Ok(session) => commands::run(&session, cli.command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(report) => {
            eprintln!("error: {}", report.current_context());
            tracing::debug!(report = %report, "command failed");
            ExitCode::FAILURE
        }
    }
}
