//! ShadowGuard Gateway Server
//!
//! Live mempool feeds, risk classification and key-gated chain queries.
//!
//! Usage:
//!   cargo run --bin shadowguard
//!
//! Environment:
//!   PORT / SHADOWGUARD_PORT      - Server port (default: 8080)
//!   SHADOWGUARD_HOST             - Server host (default: 0.0.0.0)
//!   SHADOWGUARD_DEFAULT_NETWORK  - Fallback network (default: sepolia)
//!   GATEWAY_BOOTSTRAP_KEY        - Raw API key registered at startup
//!   RUST_LOG                     - Log filter (default: info)

use shadowguard::api::{create_router, AppState};
use shadowguard::providers::{AlloyWsConnector, ProcessSimulationBridge};
use shadowguard::storage::{register_raw_key, Account, AccountStatus, InMemoryQuotaStore, QuotaStore};
use shadowguard::utils::constants::{APP_NAME, APP_VERSION};
use shadowguard::{EndpointRegistry, GatewayConfig, GatewayTelemetry};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const STATS_REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    print_banner();

    let config = Arc::new(GatewayConfig::from_env());
    let registry = Arc::new(EndpointRegistry::from_env(&config.default_network));

    let store = Arc::new(InMemoryQuotaStore::new());
    bootstrap_key(&config, store.as_ref()).await?;

    let simulator = Arc::new(ProcessSimulationBridge::from_command_line(
        &config.simulation_command,
        config.simulation_timeout,
    )?);

    let state = Arc::new(AppState::new(
        config.clone(),
        registry,
        Arc::new(AlloyWsConnector),
        store,
        simulator,
    ));

    spawn_stats_reporter(state.telemetry.clone());
    info!("📊 Stats reporter started ({}s interval)", STATS_REPORT_INTERVAL.as_secs());

    let telemetry = state.telemetry.clone();
    let sessions = state.sessions.clone();
    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 {} v{} listening on http://{}", APP_NAME, APP_VERSION, addr);
    info!("");
    info!("Endpoints:");
    info!("  GET  /v1/networks                          - Supported networks");
    info!("  GET  /v1/stream/:network                   - Live classified mempool feed (NDJSON)");
    info!("  GET  /v1/stats                             - Gateway counters");
    info!("  POST /v1/classify                          - Classify a transaction      [key]");
    info!("  POST /v1/simulate                          - External simulation         [key]");
    info!("  GET  /v1/networks/:network/address/:addr   - Balance, nonce, code        [key]");
    info!("  GET  /v1/networks/:network/gas             - Gas price and base fee      [key]");
    info!("  GET  /v1/networks/:network/tx/:hash        - Classify a known tx         [key]");
    info!("  GET  /v1/health                            - Health check");
    info!("");
    info!("Press Ctrl+C for graceful shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // open feeds never finish on their own
            sessions.shutdown();
        })
        .await?;

    info!("🛑 Shutdown signal received, cleaning up...");
    let stats = telemetry.get_stats();
    info!("   Sessions opened: {}", stats.sessions_opened);
    info!("   Tx events emitted: {}", stats.tx_emitted);
    info!("   Calls accepted: {}", stats.validations_accepted);
    info!(
        "   Calls rejected: {}",
        stats.rejected_key_required
            + stats.rejected_invalid_key
            + stats.rejected_account_inactive
            + stats.rejected_limit_reached
    );
    info!("👋 {} shutdown complete", APP_NAME);

    Ok(())
}

/// Register `GATEWAY_BOOTSTRAP_KEY` under a local operator account
async fn bootstrap_key(config: &GatewayConfig, store: &dyn QuotaStore) -> eyre::Result<()> {
    let Some(raw_key) = config.bootstrap_key.as_deref() else {
        warn!("⚠️ GATEWAY_BOOTSTRAP_KEY not set, protected endpoints will reject every call");
        return Ok(());
    };

    let account = Account::new("operator@localhost", AccountStatus::Active);
    let account_id = account.id;
    store.upsert_account(account).await?;
    register_raw_key(store, account_id, raw_key, "bootstrap", &config.bootstrap_plan).await?;
    Ok(())
}

fn spawn_stats_reporter(telemetry: Arc<GatewayTelemetry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_REPORT_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = telemetry.get_stats();
            info!(
                active_sessions = stats.sessions_active,
                tx_emitted = stats.tx_emitted,
                dropped_by_cap = stats.tx_dropped_by_cap,
                critical = stats.level_critical,
                "📊 Gateway stats"
            );
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_banner() {
    println!(
        r#"
    ╔══════════════════════════════════════════════════════╗
    ║                                                      ║
    ║   S H A D O W G U A R D                              ║
    ║                                                      ║
    ║   Real-time chain event gateway                      ║
    ║   mempool feeds · risk scoring · metered access      ║
    ║                                                      ║
    ╚══════════════════════════════════════════════════════╝
    "#
    );
}
