//! Constants Module - Single Source of Truth
//!
//! Chain identifiers, built-in public endpoints, risky function selectors,
//! known-contract labels and unit helpers. Other modules read from here
//! instead of hardcoding values.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "ShadowGuard";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for upstream HTTP requests
pub const USER_AGENT: &str = concat!("ShadowGuard/", env!("CARGO_PKG_VERSION"));

// ============================================
// GATEWAY DEFAULTS
// ============================================

/// Default timeout for HTTP RPC requests (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Keep-alive ping interval on streaming sockets (seconds)
pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;

/// Max pending-tx notifications processed per stream session
pub const DEFAULT_SESSION_CAP: u64 = 500;

/// In-flight transaction lookups per session (results stay in order)
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 8;

/// Outbound event buffer per session
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// External simulation engine timeout (seconds)
pub const DEFAULT_SIMULATION_TIMEOUT_SECS: u64 = 15;

/// Network used when a caller names an unknown one
pub const DEFAULT_NETWORK_ID: &str = "sepolia";

// ============================================
// CHAIN IDS
// ============================================

/// Ethereum Mainnet
pub const CHAIN_ID_ETHEREUM: u64 = 1;
/// Ethereum Sepolia testnet
pub const CHAIN_ID_SEPOLIA: u64 = 11155111;
/// Polygon PoS
pub const CHAIN_ID_POLYGON: u64 = 137;
/// BNB Smart Chain
pub const CHAIN_ID_BSC: u64 = 56;
/// Arbitrum One
pub const CHAIN_ID_ARBITRUM: u64 = 42161;
/// Base
pub const CHAIN_ID_BASE: u64 = 8453;

// ============================================
// BUILT-IN NETWORK CATALOGUE
// ============================================

/// Built-in defaults for one network, before environment overrides
#[derive(Debug, Clone, Copy)]
pub struct BuiltinNetwork {
    pub id: &'static str,
    /// Prefix of the `<PREFIX>_HTTP_URL` / `<PREFIX>_WSS_URL` overrides
    pub env_prefix: &'static str,
    pub chain_id: u64,
    pub name: &'static str,
    pub symbol: &'static str,
    pub http_url: &'static str,
    pub ws_urls: &'static [&'static str],
    pub explorer: &'static str,
}

/// Ordered as listed to clients
pub const BUILTIN_NETWORKS: [BuiltinNetwork; 6] = [
    BuiltinNetwork {
        id: "sepolia",
        env_prefix: "SEPOLIA",
        chain_id: CHAIN_ID_SEPOLIA,
        name: "Ethereum Sepolia Testnet",
        symbol: "ETH",
        http_url: "https://ethereum-sepolia-rpc.publicnode.com",
        ws_urls: &[
            "wss://ethereum-sepolia-rpc.publicnode.com",
            "wss://sepolia.drpc.org",
        ],
        explorer: "https://sepolia.etherscan.io",
    },
    BuiltinNetwork {
        id: "ethereum",
        env_prefix: "ETH",
        chain_id: CHAIN_ID_ETHEREUM,
        name: "Ethereum",
        symbol: "ETH",
        http_url: "https://ethereum-rpc.publicnode.com",
        ws_urls: &["wss://ethereum-rpc.publicnode.com", "wss://eth.drpc.org"],
        explorer: "https://etherscan.io",
    },
    BuiltinNetwork {
        id: "polygon",
        env_prefix: "POLYGON",
        chain_id: CHAIN_ID_POLYGON,
        name: "Polygon",
        symbol: "POL",
        http_url: "https://polygon-rpc.com",
        ws_urls: &["wss://polygon-bor-rpc.publicnode.com", "wss://polygon.drpc.org"],
        explorer: "https://polygonscan.com",
    },
    BuiltinNetwork {
        id: "bsc",
        env_prefix: "BSC",
        chain_id: CHAIN_ID_BSC,
        name: "BNB Smart Chain",
        symbol: "BNB",
        http_url: "https://bsc-dataseed.binance.org",
        ws_urls: &["wss://bsc-rpc.publicnode.com", "wss://bsc.drpc.org"],
        explorer: "https://bscscan.com",
    },
    BuiltinNetwork {
        id: "arbitrum",
        env_prefix: "ARBITRUM",
        chain_id: CHAIN_ID_ARBITRUM,
        name: "Arbitrum One",
        symbol: "ETH",
        http_url: "https://arb1.arbitrum.io/rpc",
        ws_urls: &["wss://arbitrum-one-rpc.publicnode.com"],
        explorer: "https://arbiscan.io",
    },
    BuiltinNetwork {
        id: "base",
        env_prefix: "BASE",
        chain_id: CHAIN_ID_BASE,
        name: "Base",
        symbol: "ETH",
        http_url: "https://mainnet.base.org",
        ws_urls: &["wss://base-rpc.publicnode.com", "wss://base.drpc.org"],
        explorer: "https://basescan.org",
    },
];

/// Map aliases and decimal chain ids onto a catalogue id
pub fn canonical_network_id(input: &str) -> Option<&'static str> {
    let lowered = input.trim().to_lowercase();
    let id = match lowered.as_str() {
        "eth" | "mainnet" | "ethereum" | "1" => "ethereum",
        "sepolia" | "11155111" => "sepolia",
        "polygon" | "matic" | "137" => "polygon",
        "bsc" | "bnb" | "56" => "bsc",
        "arbitrum" | "arb" | "42161" => "arbitrum",
        "base" | "8453" => "base",
        _ => return None,
    };
    Some(id)
}

// ============================================
// RISKY FUNCTION SELECTORS
// ============================================

sol! {
    interface IRiskyCalls {
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function safeTransferFrom(address from, address to, uint256 tokenId) external;
        function setApprovalForAll(address operator, bool approved) external;
        function increaseAllowance(address spender, uint256 addedValue) external returns (bool);
        function permit(address owner, address spender, uint256 value, uint256 deadline, uint8 v, bytes32 r, bytes32 s) external;
        function selfDestruct() external;
        function kill() external;
        function destroy() external;
    }
}

/// `safeTransferFrom(address,address,uint256,bytes)`, the overload sol! would rename
const SAFE_TRANSFER_FROM_WITH_DATA: [u8; 4] = [0xb8, 0x8d, 0x4f, 0xde];

lazy_static::lazy_static! {
    /// Selector -> human function name
    pub static ref RISKY_SELECTORS: HashMap<[u8; 4], &'static str> = {
        let mut m = HashMap::new();
        m.insert(IRiskyCalls::transferCall::SELECTOR, "transfer");
        m.insert(IRiskyCalls::transferFromCall::SELECTOR, "transferFrom");
        m.insert(IRiskyCalls::approveCall::SELECTOR, "approve");
        m.insert(IRiskyCalls::safeTransferFromCall::SELECTOR, "safeTransferFrom");
        m.insert(SAFE_TRANSFER_FROM_WITH_DATA, "safeTransferFrom");
        m.insert(IRiskyCalls::setApprovalForAllCall::SELECTOR, "setApprovalForAll");
        m.insert(IRiskyCalls::increaseAllowanceCall::SELECTOR, "increaseAllowance");
        m.insert(IRiskyCalls::permitCall::SELECTOR, "permit");
        m.insert(IRiskyCalls::selfDestructCall::SELECTOR, "selfDestruct");
        m.insert(IRiskyCalls::killCall::SELECTOR, "kill");
        m.insert(IRiskyCalls::destroyCall::SELECTOR, "destroy");
        m
    };

    /// chain id -> (address -> label)
    static ref KNOWN_CONTRACTS: HashMap<u64, HashMap<Address, &'static str>> = {
        let table: [(u64, &str, &str); 14] = [
            (CHAIN_ID_ETHEREUM, "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D", "Uniswap V2 Router"),
            (CHAIN_ID_ETHEREUM, "0xE592427A0AEce92De3Edee1F18E0157C05861564", "Uniswap V3 Router"),
            (CHAIN_ID_ETHEREUM, "0x68b3465833fb72A70ecDF485E0e4C7bD8665Fc45", "Uniswap V3 Router 2"),
            (CHAIN_ID_ETHEREUM, "0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F", "SushiSwap Router"),
            (CHAIN_ID_ETHEREUM, "0x1111111254EEB25477B68fb85Ed929f73A960582", "1inch Router V5"),
            (CHAIN_ID_ETHEREUM, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "WETH"),
            (CHAIN_ID_ETHEREUM, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "USDC"),
            (CHAIN_ID_SEPOLIA, "0xC532a74256D3Db42D0Bf7a0400fEFDbad7694008", "Uniswap V2 Router"),
            (CHAIN_ID_SEPOLIA, "0x7b79995e5f793A07Bc00c21412e50Ecae098E7f9", "WETH"),
            (CHAIN_ID_SEPOLIA, "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238", "USDC"),
            (CHAIN_ID_SEPOLIA, "0x6Ae43d3271ff6888e7Fc43Fd7321a503ff738951", "Aave V3 Pool"),
            (CHAIN_ID_BSC, "0x10ED43C718714eb63d5aA57B78B54704E256024E", "PancakeSwap V2 Router"),
            (CHAIN_ID_POLYGON, "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff", "QuickSwap Router"),
            (CHAIN_ID_BASE, "0x4200000000000000000000000000000000000006", "WETH"),
        ];

        let mut m: HashMap<u64, HashMap<Address, &'static str>> = HashMap::new();
        for (chain_id, addr, label) in table {
            if let Ok(address) = Address::from_str(addr) {
                m.entry(chain_id).or_default().insert(address, label);
            }
        }
        m
    };
}

/// Look up a display label for a contract address on a chain
pub fn known_contract_label(chain_id: u64, address: &Address) -> Option<&'static str> {
    KNOWN_CONTRACTS.get(&chain_id)?.get(address).copied()
}

// ============================================
// CONVERSION UTILITIES
// ============================================

/// 10^18, one native unit in wei
pub const WEI_PER_NATIVE: u128 = 1_000_000_000_000_000_000;

/// Whole native units expressed in wei
#[inline]
pub fn native_units(n: u64) -> U256 {
    U256::from(n) * U256::from(WEI_PER_NATIVE)
}

/// Convert wei to gwei (lossy, display only)
#[inline]
pub fn wei_to_gwei(wei: U256) -> f64 {
    let wei_u128: u128 = wei.try_into().unwrap_or(u128::MAX);
    wei_u128 as f64 / 1e9
}

/// Exact decimal rendering of a wei amount in native units, trailing zeros trimmed
pub fn format_native(wei: U256) -> String {
    let unit = U256::from(WEI_PER_NATIVE);
    let whole = wei / unit;
    let frac = wei % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>18}", frac.to_string());
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// `0x` plus the first four calldata bytes (fewer if the payload is shorter)
pub fn selector_hex(input: &[u8]) -> String {
    let end = input.len().min(4);
    format!("0x{}", hex::encode(&input[..end]))
}

/// Hide the key segment of provider URLs before logging
pub fn mask_url(url: &str) -> String {
    for marker in ["/v2/", "/v3/"] {
        if let Some((base, _)) = url.split_once(marker) {
            return format!("{}{}***HIDDEN***", base, marker);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_native() {
        assert_eq!(format_native(U256::ZERO), "0");
        assert_eq!(format_native(native_units(100)), "100");
        assert_eq!(format_native(U256::from(1_500_000_000_000_000_000u128)), "1.5");
        assert_eq!(format_native(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn test_wei_to_gwei() {
        assert!((wei_to_gwei(U256::from(2_500_000_000u64)) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_selector_table() {
        assert_eq!(RISKY_SELECTORS.get(&[0xa9, 0x05, 0x9c, 0xbb]), Some(&"transfer"));
        assert_eq!(RISKY_SELECTORS.get(&[0x09, 0x5e, 0xa7, 0xb3]), Some(&"approve"));
        assert_eq!(RISKY_SELECTORS.get(&[0x23, 0xb8, 0x72, 0xdd]), Some(&"transferFrom"));
        assert_eq!(RISKY_SELECTORS.get(&[0x42, 0x84, 0x2e, 0x0e]), Some(&"safeTransferFrom"));
        assert!(RISKY_SELECTORS.get(&[0xde, 0xad, 0xbe, 0xef]).is_none());
    }

    #[test]
    fn test_known_contracts() {
        let weth = Address::from_str("0x7b79995e5f793A07Bc00c21412e50Ecae098E7f9").unwrap();
        assert_eq!(known_contract_label(CHAIN_ID_SEPOLIA, &weth), Some("WETH"));
        assert_eq!(known_contract_label(CHAIN_ID_ETHEREUM, &weth), None);
    }

    #[test]
    fn test_canonical_network_id() {
        assert_eq!(canonical_network_id("ETH"), Some("ethereum"));
        assert_eq!(canonical_network_id("11155111"), Some("sepolia"));
        assert_eq!(canonical_network_id(" Matic "), Some("polygon"));
        assert_eq!(canonical_network_id("solana"), None);
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://eth-mainnet.g.alchemy.com/v2/secret"),
            "https://eth-mainnet.g.alchemy.com/v2/***HIDDEN***"
        );
        assert_eq!(mask_url("wss://sepolia.drpc.org"), "wss://sepolia.drpc.org");
    }
}
