// SPDX-License-Identifier: MIT OR Apache-2.0
//! shaderloom - headless compiler and player for node-graph shader pipelines.
//!
//! Loads a project, compiles its graph into render passes and optionally
//! plays a number of frames through the in-memory backend, printing the
//! resulting schedule.

mod cli;
mod clock;
mod commands;
mod session;
mod settings;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::settings::SessionSettings;

const DEFAULT_LOG_DIRECTIVES: [&str; 2] = ["shaderloom_app=debug", "shaderloom_graph=info"];

fn main() {
    let cli = Cli::parse();
    let settings = SessionSettings::load_or_default(cli.settings.as_deref());

    let log_filter = settings
        .as_ref()
        .ok()
        .and_then(|settings| settings.log_filter.as_deref());
    init_logging(log_filter);

    tracing::info!("Starting shaderloom v{}", env!("CARGO_PKG_VERSION"));

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load settings: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = commands::run(cli.command, settings) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Install the subscriber. `RUST_LOG` wins over the settings file, which
/// wins over the built-in directives.
fn init_logging(settings_filter: Option<&str>) {
    let env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => match settings_filter {
            Some(directives) => EnvFilter::new(directives),
            None => DEFAULT_LOG_DIRECTIVES
                .iter()
                .filter_map(|directive| directive.parse::<Directive>().ok())
                .fold(EnvFilter::new("warn"), EnvFilter::add_directive),
        },
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
