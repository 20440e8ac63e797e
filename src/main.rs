use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use opencode_teams::config::{Cli, Settings};
use opencode_teams::server;
use opencode_teams::store::StorePaths;
use opencode_teams::Coordinator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    setup_logging(cli.debug);

    let mut settings = Settings::load(cli.config.as_ref()).context("Failed to load settings")?;
    settings.apply_env();
    settings.merge_cli(&cli);
    settings.validate();

    let paths = StorePaths::resolve(settings.root_dir.clone());
    let coordinator = Arc::new(Coordinator::new(paths.clone(), settings));

    tracing::info!(
        root = %paths.root().display(),
        session = coordinator.session_id(),
        "opencode-teams server ready"
    );

    server::serve(coordinator).await
}

/// Log to stderr; stdout carries the tool-call protocol.
fn setup_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
