use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use embed_api::{AppConfig, EdgeApplicationServer, Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards flush the log writer and keep sentry alive, drop them last
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!("logger and env prepped...");

    let metrics = if config.enable_metrics {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install prometheus recorder")?;
        info!("prometheus recorder installed");
        Some(handle)
    } else {
        None
    };

    info!(
        "starting embed api on port {} with the {:?} server table",
        config.port, config.server_table
    );

    EdgeApplicationServer::serve(config, metrics)
        .await
        .context("embed server failed to start")?;

    Ok(())
}
