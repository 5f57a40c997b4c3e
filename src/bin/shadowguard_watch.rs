//! ShadowGuard terminal watcher
//!
//! Opens one live session and logs every classified transaction.
//!
//! Usage:
//!   cargo run --bin shadowguard_watch -- [network]

use shadowguard::core::{SessionManager, SessionSettings};
use shadowguard::models::{GatewayConfig, RiskLevel, StreamEvent};
use shadowguard::providers::{AlloyWsConnector, EndpointRegistry, WsSessionFactory};
use shadowguard::utils::telemetry::GatewayTelemetry;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = GatewayConfig::from_env();
    let network = std::env::args().nth(1).unwrap_or_else(|| config.default_network.clone());

    let registry = Arc::new(EndpointRegistry::from_env(&config.default_network));
    if !registry.is_known(&network) {
        warn!(requested = %network, fallback = %registry.default_network().id, "Unknown network, using default");
    }

    let telemetry = Arc::new(GatewayTelemetry::new());
    let factory = Arc::new(WsSessionFactory::new(
        registry,
        Arc::new(AlloyWsConnector),
        config.heartbeat_interval,
    ));
    let manager = SessionManager::new(factory, telemetry.clone(), SessionSettings::from_config(&config));

    let (handle, mut rx) = manager.subscribe(&network).await?;
    let explorer = handle.network().clone();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    StreamEvent::Connected { message, endpoint_index, .. } => {
                        info!(endpoint_index, "🟢 {}", message);
                    }
                    StreamEvent::Tx(tx) => {
                        let line = format!(
                            "{} {:>3} {} {} → {} {} {}",
                            tx.risk_level.emoji(),
                            tx.risk_score,
                            &tx.hash[..tx.hash.len().min(12)],
                            tx.from,
                            tx.to.as_deref().unwrap_or("CREATE"),
                            tx.value_native,
                            explorer.symbol,
                        );
                        if tx.risk_level >= RiskLevel::High {
                            warn!(reasons = ?tx.risk_reasons, url = %explorer.tx_url(&tx.hash), "{}", line);
                        } else {
                            info!("{}", line);
                        }
                    }
                    StreamEvent::Error { code, message, .. } => {
                        error!(code = %code, "{}", message);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Ctrl+C received");
                break;
            }
        }
    }

    let received = handle.received();
    handle.close().await;

    let stats = telemetry.get_stats();
    println!();
    println!("📊 Session summary ({})", explorer.name);
    println!("   Notifications processed: {}", received);
    println!("   Tx emitted:              {}", stats.tx_emitted);
    println!("   Dropped by cap:          {}", stats.tx_dropped_by_cap);
    println!("   Lookup misses:           {}", stats.resolution_misses);
    println!(
        "   Levels L/M/H/C:          {}/{}/{}/{}",
        stats.level_low, stats.level_medium, stats.level_high, stats.level_critical
    );

    Ok(())
}
