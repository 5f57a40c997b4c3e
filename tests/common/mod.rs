//! In-process upstream doubles shared by the integration tests

#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use shadowguard::models::{AppError, AppResult, GatewayConfig, NetworkConfig, PendingTxEvent};
use shadowguard::providers::{ChainConnection, EndpointRegistry, WsConnector};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub type Feed = mpsc::UnboundedSender<AppResult<B256>>;

/// Shared mempool contents: what `transaction_by_hash` can find
#[derive(Default)]
pub struct MockChain {
    txs: Mutex<HashMap<B256, PendingTxEvent>>,
    delays: Mutex<HashMap<B256, Duration>>,
}

impl MockChain {
    pub fn insert(&self, tx: PendingTxEvent) {
        self.txs.lock().unwrap().insert(tx.hash, tx);
    }

    pub fn delay(&self, hash: B256, by: Duration) {
        self.delays.lock().unwrap().insert(hash, by);
    }
}

/// Records every connect and hands back one feed sender per connection
#[derive(Default)]
pub struct MockConnector {
    pub chain: Arc<MockChain>,
    pub open: Arc<AtomicUsize>,
    pub connected_urls: Mutex<Vec<String>>,
    pub failing_urls: Mutex<HashSet<String>>,
    feeds: Mutex<Vec<Feed>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn fail(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    /// Sender feeding the n-th opened connection
    pub fn feed(&self, n: usize) -> Feed {
        self.feeds.lock().unwrap()[n].clone()
    }

    /// Drop every stored sender so subscriptions can end
    pub fn hang_up(&self) {
        self.feeds.lock().unwrap().clear();
    }

    pub fn urls(&self) -> Vec<String> {
        self.connected_urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WsConnector for MockConnector {
    async fn connect(&self, url: &str) -> AppResult<Arc<dyn ChainConnection>> {
        self.connected_urls.lock().unwrap().push(url.to_string());
        if self.failing_urls.lock().unwrap().contains(url) {
            return Err(AppError::ws_connect_failed(format!("refused: {}", url)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        self.open.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MockConnection {
            url: url.to_string(),
            chain: self.chain.clone(),
            open: self.open.clone(),
            closed: AtomicBool::new(false),
            feed: Mutex::new(Some(rx)),
        }))
    }
}

pub struct MockConnection {
    url: String,
    chain: Arc<MockChain>,
    open: Arc<AtomicUsize>,
    closed: AtomicBool,
    feed: Mutex<Option<mpsc::UnboundedReceiver<AppResult<B256>>>>,
}

#[async_trait]
impl ChainConnection for MockConnection {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn subscribe_pending(&self) -> AppResult<BoxStream<'static, AppResult<B256>>> {
        let rx = self
            .feed
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| AppError::ws_transient("already subscribed"))?;
        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
        .boxed())
    }

    async fn transaction_by_hash(&self, hash: B256) -> AppResult<Option<PendingTxEvent>> {
        let delay = self.chain.delays.lock().unwrap().get(&hash).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.chain.txs.lock().unwrap().get(&hash).cloned())
    }

    async fn block_number(&self) -> AppResult<u64> {
        Ok(1)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub fn hash(n: u8) -> B256 {
    B256::repeat_byte(n)
}

pub fn plain_transfer(n: u8) -> PendingTxEvent {
    PendingTxEvent {
        hash: hash(n),
        from: Address::repeat_byte(0x11),
        to: Some(Address::repeat_byte(0x22)),
        value: U256::from(1_000u64),
        input: Bytes::new(),
        gas_limit: 21_000,
    }
}

pub fn test_network(ws_urls: &[&str]) -> NetworkConfig {
    NetworkConfig {
        id: "sepolia".to_string(),
        chain_id: 11155111,
        name: "Ethereum Sepolia Testnet".to_string(),
        symbol: "ETH".to_string(),
        http_url: "http://127.0.0.1:9".to_string(),
        ws_urls: ws_urls.iter().map(|u| u.to_string()).collect(),
        explorer: "https://sepolia.etherscan.io".to_string(),
    }
}

pub fn test_registry(ws_urls: &[&str]) -> Arc<EndpointRegistry> {
    Arc::new(EndpointRegistry::new(vec![test_network(ws_urls)], "sepolia"))
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        heartbeat_interval: Duration::from_secs(15),
        ..GatewayConfig::default()
    }
}
