#![warn(unused_extern_crates)]

mod broker;
mod cache;
mod cmd;
mod commands;
mod config;
mod error;
mod profile;
mod saml;
mod types;
mod utils;

use std::process::ExitCode;

use broker::aliases::SignInPageAliases;
use broker::sts::StsFederation;
use broker::CredentialBroker;
use cache::AssertionStore;
use clap::Parser;
use cmd::Cli;
use commands::login::{build_selector, exec_login};
use config::SamlAuthConfig;
use error::{Error, Result};
use profile::ProfilePersister;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Uses `RUST_LOG` if set, otherwise `--log-level`. Logs go to stderr so stdout
/// stays usable for credential_process JSON and export lines.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level).map_err(|err| {
            Error::InvalidConfig(format!("invalid log level '{log_level}': {err}"))
        })?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_level)?;

    let persister = ProfilePersister::from_env();
    let stored = persister.read_config(&cli.profile)?;
    let config = SamlAuthConfig::resolve(&cli, stored)?;
    debug!(profile = %config.profile, region = %config.region, "resolved configuration");

    let mut broker = CredentialBroker::new(
        StsFederation::new(config.region.clone()),
        SignInPageAliases::new(),
        AssertionStore::new(persister.cache_dir()),
        build_selector(&config),
    );
    exec_login(&mut broker, &config, &persister, &mut std::io::stdout().lock()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_operational() => {
            eprintln!("operational error: {err}");
            ExitCode::FAILURE
        }
        Err(err @ Error::InvalidConfig(_)) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("authentication error: {err}");
            ExitCode::FAILURE
        }
    }
}
