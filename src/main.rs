use pumpwatch::application::engine::{AppState, Engine};
use pumpwatch::config::{StrategyConfig, SystemConfig};
use pumpwatch::infrastructure::api;
use pumpwatch::infrastructure::market_data::BinanceFuturesClient;
use pumpwatch::infrastructure::market_feed::MarketFeed;
use pumpwatch::infrastructure::processed_alerts::{FileAlertStore, ProcessedAlerts};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pumpwatch=info,tower_http=warn")),
        )
        .init();

    let system = SystemConfig::from_env();
    let strategy = StrategyConfig::from_env();
    info!(
        feed = %system.feed.url,
        listen = %system.listen_addr,
        initial_balance = system.initial_balance,
        "Starting pumpwatch"
    );

    let market_data = Arc::new(BinanceFuturesClient::new(&system.provider));
    let processed = ProcessedAlerts::new(
        system.max_alerts,
        Box::new(FileAlertStore::new(&system.processed_alerts_path)),
    );
    let state = Arc::new(AppState::new(
        system.clone(),
        strategy,
        market_data,
        processed,
    ));

    let (tick_tx, tick_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed_handle = MarketFeed::spawn(system.feed.clone(), tick_tx, shutdown_rx.clone());
    let engine_handle = tokio::spawn(Engine::new(state.clone()).run(tick_rx, shutdown_rx.clone()));

    let listener = tokio::net::TcpListener::bind(&system.listen_addr).await?;
    info!(addr = %system.listen_addr, "API listening");
    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, api::router(state))
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = feed_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "Ticker feed failed permanently"),
                Ok(Ok(())) => info!("Ticker feed stopped"),
                Err(e) => error!(error = %e, "Ticker feed task panicked"),
            }
        }
    }

    shutdown_tx.send(true).ok();
    engine_handle.await.ok();
    match server_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }
    info!("Shutdown complete");
    Ok(())
}
