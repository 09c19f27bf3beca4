//! Mova TSP API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mova_api::config::Config;
use mova_api::routes;
use mova_api::state::AppState;
use mova_api::vendors::incentive_hook::HttpTierClient;
use mova_api::vendors::payment::HttpPaymentClient;
use mova_api::vendors::uber::HttpUberClient;
use mova_api::workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let uber = Arc::new(HttpUberClient::new(
        config.uber_base_url.clone(),
        config.uber_secret.clone(),
    ));
    let payment = Arc::new(HttpPaymentClient::new(
        config.payment_base_url.clone(),
        config.payment_secret.clone(),
    ));
    let tier_vendor = Arc::new(HttpTierClient::new(config.incentive_hook_base_url.clone()));

    let state = Arc::new(AppState::new(config.clone(), uber, payment, tier_vendor));

    match state.load_service_profiles().await {
        Ok(count) => tracing::info!(count, "service profiles loaded"),
        Err(e) => tracing::warn!(error = %e, "no service profiles loaded"),
    }

    workers::validation::spawn(state.clone());

    let app = routes::router(state);
    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("Listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
