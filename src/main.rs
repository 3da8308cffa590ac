use std::sync::Arc;

use signalbot::collector::CandidateCollector;
use signalbot::db::Store;
use signalbot::lifecycle::TradeManager;
use signalbot::market::BinanceMarketData;
use signalbot::notify::LogSender;
use signalbot::pipeline::AutopostPipeline;
use signalbot::{AppConfig, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let config = AppConfig::from_env();
    let scan_interval_secs = config.scan_interval_secs;
    let manage_interval_secs = config.manage_interval_secs;

    tracing::info!("signalbot starting");
    tracing::info!("  symbols: {}", config.collector.symbols.join(", "));
    tracing::info!("  timeframe: {}", config.collector.timeframe);
    tracing::info!(
        "  scan every {}s, manage every {}s",
        scan_interval_secs,
        manage_interval_secs
    );

    let store = Store::connect(&config.db_path).await?;
    let market = Arc::new(BinanceMarketData::new()?);
    let sender = Arc::new(LogSender);

    let collector = CandidateCollector::new(market.clone(), config.collector.clone());
    let pipeline = Arc::new(AutopostPipeline::new(
        collector,
        store.clone(),
        sender,
        config.pipeline.clone(),
    ));
    let manager = Arc::new(TradeManager::new(
        store.clone(),
        market.clone(),
        config.lifecycle.clone(),
    ));

    // Independent periodic loops: one for the candidate scan, one for
    // lifecycle transitions.
    let scan_task = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            scan_loop(pipeline, scan_interval_secs).await;
        })
    };

    let manage_task = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manage_loop(manager, manage_interval_secs).await;
        })
    };

    tracing::info!("all loops spawned, press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down...");
        }
        result = scan_task => {
            tracing::error!("scan loop exited: {:?}", result);
        }
        result = manage_task => {
            tracing::error!("manage loop exited: {:?}", result);
        }
    }

    tracing::info!("signalbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalbot=info".into()),
        )
        .init();
}

/// Candidate scan loop: collect, gate, reserve, persist, emit.
async fn scan_loop(pipeline: Arc<AutopostPipeline>, interval_secs: u64) {
    tracing::info!("scan loop starting (every {}s)", interval_secs);

    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match pipeline.run_once().await {
            Ok(prepared) if !prepared.is_empty() => {
                tracing::info!("scan: emitted {} signal(s)", prepared.len());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("scan pass failed: {}", e);
            }
        }
    }
}

/// Lifecycle loop: TP/SL closes, partial TP, break-even, trailing, NEUTRAL.
async fn manage_loop(manager: Arc<TradeManager>, interval_secs: u64) {
    tracing::info!("manage loop starting (every {}s)", interval_secs);

    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match manager.run_once().await {
            Ok(updated) if updated > 0 => {
                tracing::info!("manage: {} trade(s) updated", updated);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("manage pass failed: {}", e);
            }
        }
    }
}
