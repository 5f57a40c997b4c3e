//! WebSocket Session Factory
//!
//! Every stream session gets its own upstream socket. Endpoints are picked
//! round-robin per network; each opened socket gets a keep-alive heartbeat
//! whose lifetime is tied to the returned handle.
//!
//! Connection errors after open are surfaced to the session owner. There is no
//! in-session reconnect: a new session rotates to the next endpoint.

use alloy::pubsub::PubSubFrontend;
use alloy_primitives::B256;
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::TransactionTrait;
use alloy_transport_ws::WsConnect;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::{AppError, AppResult, ErrorCode, NetworkConfig, PendingTxEvent};
use crate::providers::registry::EndpointRegistry;
use crate::utils::constants::mask_url;

// ============================================
// CONNECTION TRAITS
// ============================================

/// One open upstream socket
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// URL this connection was opened against
    fn endpoint(&self) -> &str;

    /// Stream of pending transaction hashes; ends when the socket is unusable
    async fn subscribe_pending(&self) -> AppResult<BoxStream<'static, AppResult<B256>>>;

    /// `Ok(None)` when the node no longer knows the hash
    async fn transaction_by_hash(&self, hash: B256) -> AppResult<Option<PendingTxEvent>>;

    async fn block_number(&self) -> AppResult<u64>;

    /// Release the socket. Idempotent.
    fn close(&self);
}

/// Opens connections; swapped for an in-process double in tests
#[async_trait]
pub trait WsConnector: Send + Sync {
    async fn connect(&self, url: &str) -> AppResult<Arc<dyn ChainConnection>>;
}

// ============================================
// ALLOY PUBSUB CONNECTION
// ============================================

type WsProvider = RootProvider<PubSubFrontend>;

/// Production connector backed by alloy's WebSocket pubsub transport
#[derive(Debug, Default, Clone)]
pub struct AlloyWsConnector;

#[async_trait]
impl WsConnector for AlloyWsConnector {
    async fn connect(&self, url: &str) -> AppResult<Arc<dyn ChainConnection>> {
        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(url))
            .await
            .map_err(|e| AppError::with_source(ErrorCode::WsConnectFailed, format!("Failed to connect to {}", mask_url(url)), e))?;

        Ok(Arc::new(AlloyWsConnection {
            endpoint: url.to_string(),
            provider: Mutex::new(Some(provider)),
        }))
    }
}

/// Dropping the last provider clone shuts the pubsub backend and its socket
pub struct AlloyWsConnection {
    endpoint: String,
    provider: Mutex<Option<WsProvider>>,
}

impl AlloyWsConnection {
    fn provider(&self) -> AppResult<WsProvider> {
        let guard = match self.provider.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .clone()
            .ok_or_else(|| AppError::ws_stream_closed("Connection already closed"))
    }
}

#[async_trait]
impl ChainConnection for AlloyWsConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn subscribe_pending(&self) -> AppResult<BoxStream<'static, AppResult<B256>>> {
        let provider = self.provider()?;
        let subscription = provider
            .subscribe_pending_transactions()
            .await
            .map_err(|e| AppError::with_source(ErrorCode::WsSubscribeFailed, "Failed to subscribe to pending transactions", e))?;

        Ok(subscription.into_stream().map(Ok).boxed())
    }

    async fn transaction_by_hash(&self, hash: B256) -> AppResult<Option<PendingTxEvent>> {
        let provider = self.provider()?;
        let tx = provider.get_transaction_by_hash(hash).await?;

        Ok(tx.map(|tx| PendingTxEvent {
            hash,
            from: tx.from,
            to: TransactionTrait::to(&tx),
            value: TransactionTrait::value(&tx),
            input: TransactionTrait::input(&tx).clone(),
            gas_limit: TransactionTrait::gas_limit(&tx),
        }))
    }

    async fn block_number(&self) -> AppResult<u64> {
        let provider = self.provider()?;
        Ok(provider.get_block_number().await?)
    }

    fn close(&self) {
        let taken = match self.provider.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if taken.is_some() {
            debug!(endpoint = %mask_url(&self.endpoint), "🔌 WebSocket connection closed");
        }
    }
}

// ============================================
// ROUND-ROBIN ROTATOR
// ============================================

/// Per-network counter; approximate fairness under concurrent opens is fine
#[derive(Debug, Default)]
pub struct EndpointRotator {
    counters: DashMap<String, AtomicUsize>,
}

impl EndpointRotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-increment the network's counter, reduced modulo `len`
    pub fn next_index(&self, network_id: &str, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        if let Some(counter) = self.counters.get(network_id) {
            return counter.fetch_add(1, Ordering::Relaxed) % len;
        }
        let counter = self.counters.entry(network_id.to_string()).or_default();
        counter.fetch_add(1, Ordering::Relaxed) % len
    }
}

// ============================================
// HEARTBEAT
// ============================================

/// Owns the keep-alive task. Dropping it cancels the timer.
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Cancel and wait until the task is gone
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Decrements the live-heartbeat count when the task's future is dropped
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn spawn_heartbeat(
    connection: Arc<dyn ChainConnection>,
    period: Duration,
    live: Arc<AtomicUsize>,
) -> HeartbeatHandle {
    let guard = LiveGuard::enter(live);
    let task = tokio::spawn(async move {
        let _guard = guard;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            // keep-alive only; result and error are both irrelevant
            let _ = connection.block_number().await;
        }
    });
    HeartbeatHandle { task: Some(task) }
}

// ============================================
// SESSION FACTORY
// ============================================

/// A freshly opened upstream session
pub struct OpenedSession {
    pub network: Arc<NetworkConfig>,
    pub endpoint_index: usize,
    pub connection: Arc<dyn ChainConnection>,
    pub heartbeat: HeartbeatHandle,
}

pub struct WsSessionFactory {
    registry: Arc<EndpointRegistry>,
    connector: Arc<dyn WsConnector>,
    rotator: EndpointRotator,
    heartbeat_interval: Duration,
    live_heartbeats: Arc<AtomicUsize>,
}

impl WsSessionFactory {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        connector: Arc<dyn WsConnector>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            registry,
            connector,
            rotator: EndpointRotator::new(),
            heartbeat_interval,
            live_heartbeats: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pick the next endpoint for a network without opening anything
    pub fn select_endpoint(&self, network_id: &str) -> AppResult<(Arc<NetworkConfig>, usize)> {
        let network = self.registry.resolve(network_id);
        if network.ws_urls.is_empty() {
            return Err(AppError::new(
                ErrorCode::ConfigInvalidValue,
                format!("No WebSocket endpoints configured for {}", network.id),
            ));
        }
        let index = self.rotator.next_index(&network.id, network.ws_urls.len());
        Ok((network, index))
    }

    /// Open a connection on the next endpoint and start its heartbeat
    pub async fn open_session(&self, network_id: &str) -> AppResult<OpenedSession> {
        let (network, endpoint_index) = self.select_endpoint(network_id)?;
        let url = &network.ws_urls[endpoint_index];

        let connection = match self.connector.connect(url).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(
                    network = %network.id,
                    endpoint = %mask_url(url),
                    endpoint_index,
                    "❌ WebSocket connect failed: {}",
                    e
                );
                return Err(e);
            }
        };

        info!(
            network = %network.id,
            endpoint = %mask_url(url),
            endpoint_index,
            "📡 WebSocket session opened"
        );

        let heartbeat = spawn_heartbeat(
            connection.clone(),
            self.heartbeat_interval,
            self.live_heartbeats.clone(),
        );

        Ok(OpenedSession {
            network,
            endpoint_index,
            connection,
            heartbeat,
        })
    }

    /// Heartbeat tasks currently alive across all sessions
    pub fn live_heartbeats(&self) -> usize {
        self.live_heartbeats.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct PingCounter {
        pings: AtomicU64,
    }

    #[async_trait]
    impl ChainConnection for PingCounter {
        fn endpoint(&self) -> &str {
            "wss://test"
        }

        async fn subscribe_pending(&self) -> AppResult<BoxStream<'static, AppResult<B256>>> {
            Ok(futures_util::stream::empty().boxed())
        }

        async fn transaction_by_hash(&self, _hash: B256) -> AppResult<Option<PendingTxEvent>> {
            Ok(None)
        }

        async fn block_number(&self) -> AppResult<u64> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Err(AppError::ws_transient("ignored"))
        }

        fn close(&self) {}
    }

    #[test]
    fn test_rotator_cycles_per_network() {
        let rotator = EndpointRotator::new();
        let picks: Vec<usize> = (0..7).map(|_| rotator.next_index("sepolia", 3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(rotator.next_index("polygon", 2), 0);
        assert_eq!(rotator.next_index("sepolia", 3), 1);
        assert_eq!(rotator.next_index("empty", 0), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_and_stops() {
        let conn = Arc::new(PingCounter {
            pings: AtomicU64::new(0),
        });
        let live = Arc::new(AtomicUsize::new(0));
        let handle = spawn_heartbeat(conn.clone(), Duration::from_secs(15), live.clone());
        assert_eq!(live.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(46)).await;
        assert_eq!(conn.pings.load(Ordering::SeqCst), 3);
        assert!(handle.is_running());

        handle.stop().await;
        assert_eq!(live.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(conn.pings.load(Ordering::SeqCst), 3);
    }
}
