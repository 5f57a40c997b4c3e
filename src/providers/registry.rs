//! Endpoint Registry
//!
//! Per-network HTTP and WebSocket endpoints, built once at startup. Lookups
//! never fail: unknown network ids resolve to the default network.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::NetworkConfig;
use crate::utils::constants::{
    canonical_network_id, mask_url, BUILTIN_NETWORKS, DEFAULT_NETWORK_ID,
};

/// Discovery entry returned by `list`
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    pub symbol: String,
    pub explorer: String,
    pub ws_endpoints: usize,
}

/// Immutable network table
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    networks: HashMap<String, Arc<NetworkConfig>>,
    order: Vec<String>,
    default_id: String,
}

impl EndpointRegistry {
    /// Built-in catalogue with environment overrides
    pub fn from_env(default_network: &str) -> Self {
        Self::from_lookup(default_network, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(default_network: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let configs = BUILTIN_NETWORKS
            .iter()
            .map(|builtin| NetworkConfig::from_builtin(builtin, &lookup))
            .collect();
        Self::new(configs, default_network)
    }

    /// Build from explicit configs; the first entry wins if the default is unknown
    pub fn new(configs: Vec<NetworkConfig>, default_network: &str) -> Self {
        let mut networks = HashMap::new();
        let mut order = Vec::new();

        for config in configs {
            if config.ws_urls.is_empty() {
                warn!(network = %config.id, "Network has no WebSocket endpoints, skipping");
                continue;
            }
            debug!(
                network = %config.id,
                http = %mask_url(&config.http_url),
                ws_endpoints = config.ws_urls.len(),
                "Registered network"
            );
            order.push(config.id.clone());
            networks.insert(config.id.clone(), Arc::new(config));
        }

        let wanted = canonical_network_id(default_network)
            .map(str::to_string)
            .unwrap_or_else(|| default_network.trim().to_lowercase());
        let default_id = if networks.contains_key(&wanted) {
            wanted
        } else if networks.contains_key(DEFAULT_NETWORK_ID) {
            warn!(network = %default_network, "Unknown default network, using {}", DEFAULT_NETWORK_ID);
            DEFAULT_NETWORK_ID.to_string()
        } else {
            order.first().cloned().unwrap_or_default()
        };

        info!(networks = order.len(), default = %default_id, "🌐 Endpoint registry ready");

        Self {
            networks,
            order,
            default_id,
        }
    }

    /// Resolve a network id, alias or decimal chain id; unknown input gets the default
    pub fn resolve(&self, network_id: &str) -> Arc<NetworkConfig> {
        let lowered = network_id.trim().to_lowercase();
        let key = canonical_network_id(&lowered)
            .map(str::to_string)
            .unwrap_or(lowered);

        match self.networks.get(&key) {
            Some(config) => config.clone(),
            None => {
                debug!(network = %network_id, fallback = %self.default_id, "Unknown network, using default");
                self.default_network()
            }
        }
    }

    /// True when the id (or alias) names a registered network
    pub fn is_known(&self, network_id: &str) -> bool {
        let lowered = network_id.trim().to_lowercase();
        let key = canonical_network_id(&lowered).unwrap_or(lowered.as_str());
        self.networks.contains_key(key)
    }

    pub fn default_network(&self) -> Arc<NetworkConfig> {
        match self.networks.get(&self.default_id) {
            Some(config) => config.clone(),
            // `new` only leaves default_id empty when no network survived
            None => Arc::new(NetworkConfig {
                id: DEFAULT_NETWORK_ID.to_string(),
                chain_id: 0,
                name: String::new(),
                symbol: String::new(),
                http_url: String::new(),
                ws_urls: Vec::new(),
                explorer: String::new(),
            }),
        }
    }

    /// Known networks in catalogue order
    pub fn list(&self) -> Vec<NetworkSummary> {
        self.order
            .iter()
            .filter_map(|id| self.networks.get(id))
            .map(|config| NetworkSummary {
                id: config.id.clone(),
                name: config.name.clone(),
                chain_id: config.chain_id,
                symbol: config.symbol.clone(),
                explorer: config.explorer.clone(),
                ws_endpoints: config.ws_urls.len(),
            })
            .collect()
    }
}
