mod api;
mod artifacts;
mod classifier;
mod config;
mod engine;
mod handler;
mod manifest;
mod table;
mod types;

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use api::AppState;
use config::Config;

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,credit_risk_server=debug".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);
    tracing::info!("Starting credit risk server with config: {:?}", config);

    let paths = artifacts::resolve(&config).await?;
    tracing::info!(model = %paths.model.display(), "Loading artifacts...");
    let handler = artifacts::load(&paths)?;

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = api::router(AppState::new(Arc::new(handler)), config.max_upload_bytes())
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());

    axum::serve(listener, app).await?;
    Ok(())
}
