//! Providers Module - Upstream connectivity
//!
//! Endpoint registry, HTTP JSON-RPC cache, WebSocket session factory and the
//! external simulation engine bridge.

pub mod registry;
pub mod rpc;
pub mod simulation;
pub mod websocket;

pub use registry::{EndpointRegistry, NetworkSummary};
pub use rpc::{HttpConnectionCache, HttpRpcClient};
pub use simulation::{ProcessSimulationBridge, SimulationBridge, SimulationOutcome, SimulationRequest};
pub use websocket::{
    AlloyWsConnector, ChainConnection, EndpointRotator, HeartbeatHandle, OpenedSession, WsConnector,
    WsSessionFactory,
};
