use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use cosmic_core::loggers::setup_logging;
use cosmic_core::transport::WsTransport;
use cosmic_core::{DataUpdateEvent, SyncEngine};

mod monitor_logic;
use monitor_logic::{config, render};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    setup_logging(
        config.log_dir.as_deref(),
        "cosmic_monitor",
        config.log_level.as_deref().unwrap_or("info"),
    )?;

    let ws_url = config
        .ws_url
        .clone()
        .context("no WebSocket endpoint configured (set COSMIC_WS_URL or --ws-url)")?;
    let transport = WsTransport::new(&ws_url)?;
    let engine = SyncEngine::init(config.sync_config(), Arc::new(transport))?;
    log::info!("{}", engine.config());

    let _state_sub = engine.on_state_change(|state| {
        println!("{}", render::state_line(*state));
        Ok(())
    });
    let _data_sub = engine.on_data_update(|event| {
        match event {
            DataUpdateEvent::Updated { snapshot, .. } => {
                for line in render::snapshot_lines(snapshot) {
                    println!("{}", line);
                }
            }
            DataUpdateEvent::Stale { last_updated } => {
                println!("{}", render::stale_line(*last_updated));
            }
        }
        Ok(())
    });

    engine.connect().await;

    let period = Duration::from_secs(config.stats_interval_seconds.unwrap_or(30).max(1));
    let mut stats_tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = stats_tick.tick() => {
                println!("{}", render::stats_line(engine.state(), &engine.stats()));
            }
        }
    }

    engine.teardown();
    log::info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => log::info!("SIGTERM received, initiating shutdown."),
    }
}
