//! Stream Session Manager
//!
//! One upstream socket, one heartbeat and one outbound channel per client.
//! The pump task resolves pending hashes in arrival order (lookups run
//! concurrently, results are emitted in order), classifies them and pushes
//! `tx` events. `connected` is always the first event on the channel.
//!
//! The `SessionHandle` owns the pump, the heartbeat and the connection.
//! Dropping it (client disconnect) or calling `close` tears all three down.

use alloy_primitives::B256;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::risk_classifier::classify;
use crate::models::{AppError, AppResult, ErrorCode, GatewayConfig, NetworkConfig, StreamEvent, TxEventData};
use crate::providers::registry::NetworkSummary;
use crate::providers::websocket::{ChainConnection, HeartbeatHandle, WsSessionFactory};
use crate::utils::constants::{known_contract_label, mask_url};
use crate::utils::telemetry::GatewayTelemetry;

/// Per-session limits
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Max notifications processed; later ones are dropped silently
    pub cap: u64,
    pub resolve_concurrency: usize,
    pub channel_capacity: usize,
}

impl SessionSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            cap: config.session_cap,
            resolve_concurrency: config.resolve_concurrency.max(1),
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// Listing entry for an open session
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub network: String,
    pub endpoint_index: usize,
    pub opened_at: chrono::DateTime<chrono::Utc>,
}

pub struct SessionManager {
    factory: Arc<WsSessionFactory>,
    telemetry: Arc<GatewayTelemetry>,
    settings: SessionSettings,
    active: Arc<DashMap<Uuid, SessionInfo>>,
    shutdown: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(
        factory: Arc<WsSessionFactory>,
        telemetry: Arc<GatewayTelemetry>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            factory,
            telemetry,
            settings,
            active: Arc::new(DashMap::new()),
            shutdown: watch::channel(false).0,
        }
    }

    /// End every attached feed and refuse new subscriptions
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!(active_sessions = self.active_sessions(), "🛑 Ending live feeds");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once `shutdown` has been called
    pub fn shutdown_notice(&self) -> BoxFuture<'static, ()> {
        let mut rx = self.shutdown.subscribe();
        async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
        .boxed()
    }

    /// Networks clients may subscribe to; no side effects
    pub fn list_networks(&self) -> Vec<NetworkSummary> {
        self.factory.registry().list()
    }

    pub fn active_sessions(&self) -> usize {
        self.active.len()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.active.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Open a live feed for one network
    pub async fn subscribe(&self, network_id: &str) -> AppResult<(SessionHandle, mpsc::Receiver<StreamEvent>)> {
        if self.is_shutting_down() {
            return Err(AppError::new(ErrorCode::ApiUnavailable, "Gateway is shutting down"));
        }

        let opened = match self.factory.open_session(network_id).await {
            Ok(opened) => opened,
            Err(e) => {
                self.telemetry.record_session_open_failure();
                return Err(e);
            }
        };

        let upstream = match opened.connection.subscribe_pending().await {
            Ok(stream) => stream,
            Err(e) => {
                self.telemetry.record_session_open_failure();
                opened.heartbeat.stop().await;
                opened.connection.close();
                warn!(network = %opened.network.id, "❌ Pending-tx subscription failed: {}", e);
                return Err(if e.code == ErrorCode::WsSubscribeFailed {
                    e
                } else {
                    AppError::new(ErrorCode::WsSubscribeFailed, e.message)
                });
            }
        };

        let id = Uuid::new_v4();
        let network = opened.network.clone();
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity);

        // fresh channel with capacity >= 1, cannot be full
        let _ = tx.try_send(StreamEvent::Connected {
            session_id: id,
            network: network.id.clone(),
            chain_id: network.chain_id,
            endpoint_index: opened.endpoint_index,
            message: format!("Connected to {} mempool feed", network.name),
        });

        let received = Arc::new(AtomicU64::new(0));
        let pump = tokio::spawn(run_pump(
            upstream,
            opened.connection.clone(),
            network.clone(),
            tx,
            received.clone(),
            self.settings,
            self.telemetry.clone(),
        ));

        self.active.insert(
            id,
            SessionInfo {
                id,
                network: network.id.clone(),
                endpoint_index: opened.endpoint_index,
                opened_at: chrono::Utc::now(),
            },
        );
        self.telemetry.record_session_opened();
        info!(
            session = %id,
            network = %network.id,
            endpoint = %mask_url(opened.connection.endpoint()),
            "🟢 Stream session started"
        );

        let handle = SessionHandle {
            id,
            network,
            endpoint_index: opened.endpoint_index,
            received,
            pump: Some(pump),
            heartbeat: Some(opened.heartbeat),
            connection: opened.connection,
            active: self.active.clone(),
            telemetry: self.telemetry.clone(),
            closed: false,
        };

        Ok((handle, rx))
    }
}

async fn run_pump(
    upstream: futures_util::stream::BoxStream<'static, AppResult<B256>>,
    connection: Arc<dyn ChainConnection>,
    network: Arc<NetworkConfig>,
    out: mpsc::Sender<StreamEvent>,
    received: Arc<AtomicU64>,
    settings: SessionSettings,
    telemetry: Arc<GatewayTelemetry>,
) {
    let events = upstream
        .map(|item| -> BoxFuture<'static, Option<StreamEvent>> {
            match item {
                Ok(hash) => {
                    if received.load(Ordering::Relaxed) >= settings.cap {
                        telemetry.record_dropped_by_cap();
                        return future::ready(None).boxed();
                    }
                    received.fetch_add(1, Ordering::Relaxed);
                    resolve_event(hash, connection.clone(), network.clone(), telemetry.clone()).boxed()
                }
                Err(e) => {
                    telemetry.record_stream_error();
                    warn!(network = %network.id, "⚠️ Upstream error: {}", e);
                    future::ready(Some(StreamEvent::Error {
                        network: network.id.clone(),
                        code: e.code_str().to_string(),
                        message: e.message,
                    }))
                    .boxed()
                }
            }
        })
        .buffered(settings.resolve_concurrency);
    futures_util::pin_mut!(events);

    while let Some(event) = events.next().await {
        if let Some(event) = event {
            if out.send(event).await.is_err() {
                debug!(network = %network.id, "Client channel closed, stopping pump");
                return;
            }
        }
    }

    let closed = AppError::ws_stream_closed("Upstream subscription ended");
    telemetry.record_stream_error();
    let _ = out
        .send(StreamEvent::Error {
            network: network.id.clone(),
            code: closed.code_str().to_string(),
            message: closed.message,
        })
        .await;
    info!(network = %network.id, "🔴 Upstream subscription ended");
}

/// Lookup misses are expected mempool races and are swallowed
async fn resolve_event(
    hash: B256,
    connection: Arc<dyn ChainConnection>,
    network: Arc<NetworkConfig>,
    telemetry: Arc<GatewayTelemetry>,
) -> Option<StreamEvent> {
    let tx = match connection.transaction_by_hash(hash).await {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            telemetry.record_resolution_miss();
            return None;
        }
        Err(e) => {
            telemetry.record_resolution_miss();
            debug!(network = %network.id, tx = %hash, "Lookup failed: {}", e);
            return None;
        }
    };

    let risk = classify(&tx);
    telemetry.record_tx(risk.level);
    let label = tx
        .to
        .and_then(|to| known_contract_label(network.chain_id, &to))
        .map(str::to_string);

    Some(StreamEvent::Tx(Box::new(TxEventData::new(&tx, risk, &network.id, label))))
}

/// Owner of one session's resources
pub struct SessionHandle {
    id: Uuid,
    network: Arc<NetworkConfig>,
    endpoint_index: usize,
    received: Arc<AtomicU64>,
    pump: Option<JoinHandle<()>>,
    heartbeat: Option<HeartbeatHandle>,
    connection: Arc<dyn ChainConnection>,
    active: Arc<DashMap<Uuid, SessionInfo>>,
    telemetry: Arc<GatewayTelemetry>,
    closed: bool,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("endpoint_index", &self.endpoint_index)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn endpoint_index(&self) -> usize {
        self.endpoint_index
    }

    /// Notifications accepted so far, never above the cap
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Tear down and wait until the pump and heartbeat tasks are gone
    pub async fn close(mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        // dropping the handle aborts the task
        self.heartbeat.take();
        self.connection.close();
        self.active.remove(&self.id);
        self.telemetry.record_session_closed();
        info!(
            session = %self.id,
            network = %self.network.id,
            received = self.received(),
            "⚪ Stream session closed"
        );
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
