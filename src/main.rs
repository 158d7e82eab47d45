//! Retention monitor - one capacity check per scheduler tick
//!
//! Exits 0 after a normal round (including skipped and no-op rounds) and
//! non-zero on invalid configuration or when the store stays unreachable.

use anyhow::Context;
use retention_monitor::config::{Backend, Config};
use retention_monitor::controller::Controller;
use retention_monitor::models::Outcome;
use retention_monitor::sink::FileStateSink;
use retention_monitor::store::{ClickHouseConnector, Connector, PostgresConnector};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(config.as_ref().map(|c| c.json_logs).unwrap_or(false));
    let config = config.context("Invalid configuration")?;

    info!("Retention monitor v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        backend = config.store.backend.name(),
        store = config.store.redacted_url(),
        table = %config.table.qualified(),
        probe = config.probe.name(),
        threshold = config.threshold,
        delete_percentage = config.delete_percentage,
        skip_rounds = config.skip_rounds,
        state_file = %config.state_file.display(),
        "Configuration loaded"
    );

    let outcome = match config.store.backend {
        Backend::ClickHouse => {
            let connector = ClickHouseConnector::new(&config.store)?;
            run(connector, &config).await?
        }
        Backend::Postgres => run(PostgresConnector::new(&config.store), &config).await?,
    };

    info!(outcome = %serde_json::to_string(&outcome)?, "Done");
    Ok(())
}

async fn run<C: Connector>(connector: C, config: &Config) -> retention_monitor::Result<Outcome> {
    let sink = FileStateSink::new(&config.state_file).with_max_bytes(config.state_max_bytes);
    Controller::from_config(connector, sink, config).run_once().await
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "retention_monitor=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
