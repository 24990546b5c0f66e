mod app_state;
mod cli;
mod config;
mod consts;
mod conversation;
mod error;
mod key_gate;
mod poller;
mod remote;
mod sentry_scrub;
mod studio;

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app_state::AppState;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

async fn main_impl(command: Commands, app_config: AppConfig) -> Result<()> {
    let state = AppState::new(app_config, std::io::stdin().is_terminal())?;
    cli::run(command, &state).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::load(cli.config.as_deref())?;

    let dsn = app_config
        .sentry_dsn
        .as_deref()
        .filter(|dsn| !dsn.is_empty())
        .map(str::parse::<sentry::types::Dsn>)
        .transpose()
        .context("Invalid sentry_dsn")?;

    let _guard = sentry::init(sentry::ClientOptions {
        dsn,
        release: sentry::release_name!(),
        attach_stacktrace: true,
        before_send: Some(crate::sentry_scrub::create_before_send()),
        ..Default::default()
    });

    // errors become events, warnings breadcrumbs
    let sentry_layer = sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}={},hyper=warn,reqwest=warn",
                    env!("CARGO_CRATE_NAME"),
                    level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_layer)
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(main_impl(cli.command, app_config))
}
