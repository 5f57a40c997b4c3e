//! Configuration module for the gateway
//!
//! Values come from built-in defaults in utils/constants.rs, overridden by
//! environment variables. Read once at startup, then shared behind `Arc`.

use std::time::Duration;
use tracing::warn;

use crate::utils::constants::{
    BuiltinNetwork, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HEARTBEAT_SECS, DEFAULT_NETWORK_ID,
    DEFAULT_RESOLVE_CONCURRENCY, DEFAULT_RPC_TIMEOUT_SECS, DEFAULT_SESSION_CAP,
    DEFAULT_SIMULATION_TIMEOUT_SECS,
};

/// Immutable description of one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub id: String,
    pub chain_id: u64,
    pub name: String,
    pub symbol: String,
    pub http_url: String,
    /// Rotation candidates, never empty
    pub ws_urls: Vec<String>,
    pub explorer: String,
}

impl NetworkConfig {
    /// Apply `<PREFIX>_HTTP_URL` / `<PREFIX>_WSS_URL` overrides to a built-in entry
    pub fn from_builtin<F>(builtin: &BuiltinNetwork, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let http_url = lookup(&format!("{}_HTTP_URL", builtin.env_prefix))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| builtin.http_url.to_string());

        let ws_urls = lookup(&format!("{}_WSS_URL", builtin.env_prefix))
            .map(|v| parse_endpoint_list(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| builtin.ws_urls.iter().map(|u| u.to_string()).collect());

        Self {
            id: builtin.id.to_string(),
            chain_id: builtin.chain_id,
            name: builtin.name.to_string(),
            symbol: builtin.symbol.to_string(),
            http_url,
            ws_urls,
            explorer: builtin.explorer.to_string(),
        }
    }

    /// Explorer link for a transaction hash
    pub fn tx_url(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.explorer, hash)
    }
}

/// Split a comma-delimited endpoint override; a single value is a one-element list
pub fn parse_endpoint_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Process-wide gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Fallback for unknown network ids
    pub default_network: String,
    pub heartbeat_interval: Duration,
    /// Max notifications processed per stream session
    pub session_cap: u64,
    pub resolve_concurrency: usize,
    pub channel_capacity: usize,
    pub rpc_timeout: Duration,
    /// Command line of the external simulation engine
    pub simulation_command: String,
    pub simulation_timeout: Duration,
    /// Optional raw key registered at startup
    pub bootstrap_key: Option<String>,
    pub bootstrap_plan: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            default_network: DEFAULT_NETWORK_ID.to_string(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            session_cap: DEFAULT_SESSION_CAP,
            resolve_concurrency: DEFAULT_RESOLVE_CONCURRENCY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            simulation_command: "python main.py".to_string(),
            simulation_timeout: Duration::from_secs(DEFAULT_SIMULATION_TIMEOUT_SECS),
            bootstrap_key: None,
            bootstrap_plan: "demo".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = lookup("PORT")
            .or_else(|| lookup("SHADOWGUARD_PORT"))
            .map(|v| parse_or("PORT", &v, defaults.port))
            .unwrap_or(defaults.port);

        let secs = |key: &str, default: Duration| -> Duration {
            lookup(key)
                .map(|v| Duration::from_secs(parse_or(key, &v, default.as_secs())))
                .filter(|d| !d.is_zero())
                .unwrap_or(default)
        };

        Self {
            host: lookup("SHADOWGUARD_HOST").unwrap_or(defaults.host),
            port,
            default_network: lookup("SHADOWGUARD_DEFAULT_NETWORK")
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.default_network),
            heartbeat_interval: secs("SHADOWGUARD_HEARTBEAT_SECS", defaults.heartbeat_interval),
            session_cap: lookup("SHADOWGUARD_SESSION_CAP")
                .map(|v| parse_or("SHADOWGUARD_SESSION_CAP", &v, defaults.session_cap))
                .unwrap_or(defaults.session_cap),
            resolve_concurrency: lookup("SHADOWGUARD_RESOLVE_CONCURRENCY")
                .map(|v| parse_or("SHADOWGUARD_RESOLVE_CONCURRENCY", &v, defaults.resolve_concurrency))
                .map(|n| n.max(1))
                .unwrap_or(defaults.resolve_concurrency),
            channel_capacity: lookup("SHADOWGUARD_CHANNEL_CAPACITY")
                .map(|v| parse_or("SHADOWGUARD_CHANNEL_CAPACITY", &v, defaults.channel_capacity))
                .map(|n| n.max(1))
                .unwrap_or(defaults.channel_capacity),
            rpc_timeout: secs("RPC_TIMEOUT_SECS", defaults.rpc_timeout),
            simulation_command: lookup("SIMULATION_COMMAND")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.simulation_command),
            simulation_timeout: secs("SIMULATION_TIMEOUT", defaults.simulation_timeout),
            bootstrap_key: lookup("GATEWAY_BOOTSTRAP_KEY").filter(|v| !v.trim().is_empty()),
            bootstrap_plan: lookup("GATEWAY_BOOTSTRAP_PLAN").unwrap_or(defaults.bootstrap_plan),
        }
    }

    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, raw: &str, default: T) -> T {
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value = raw, "Invalid numeric config value, using default {}", default);
            default
        }
    }
}
