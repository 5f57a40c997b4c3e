//! HTTP surface tests: key gating, rate-limit headers, feeds and discovery

mod common;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use common::*;
use serde_json::{json, Value};
use shadowguard::api::{create_router, AppState};
use shadowguard::models::{AppResult, NetworkConfig, PendingTxEvent};
use shadowguard::providers::{EndpointRegistry, SimulationBridge, SimulationOutcome, SimulationRequest};
use shadowguard::storage::{register_raw_key, Account, AccountStatus, InMemoryQuotaStore, QuotaStore};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Echoes the request back as the verdict record
#[derive(Default)]
struct StubSimulator {
    seen: Mutex<Vec<SimulationRequest>>,
}

#[async_trait]
impl SimulationBridge for StubSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> AppResult<SimulationOutcome> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(SimulationOutcome {
            record: json!({ "verdict": "safe", "to": request.to }),
            execution_time_s: Some(0.25),
            steps: 3,
            elapsed_ms: 1,
        })
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryQuotaStore>,
    connector: Arc<MockConnector>,
    simulator: Arc<StubSimulator>,
    state: Arc<AppState>,
}

fn test_app() -> TestApp {
    test_app_with(test_registry(&["wss://a", "wss://b"]))
}

fn test_app_with(registry: Arc<EndpointRegistry>) -> TestApp {
    let store = Arc::new(InMemoryQuotaStore::new());
    let connector = MockConnector::new();
    let simulator = Arc::new(StubSimulator::default());
    let state = Arc::new(AppState::new(
        Arc::new(test_config()),
        registry,
        connector.clone(),
        store.clone(),
        simulator.clone(),
    ));
    TestApp {
        router: create_router(state.clone()),
        store,
        connector,
        simulator,
        state,
    }
}

/// Minimal JSON-RPC node: knows one transaction, hash(7)
async fn fake_node(Json(req): Json<Value>) -> Json<Value> {
    let known = json!(format!("{:#x}", hash(7)));
    let result = match req["method"].as_str() {
        Some("eth_chainId") => json!("0xaa36a7"),
        Some("eth_gasPrice") => json!("0x9502f900"),
        Some("eth_getBlockByNumber") => json!({ "number": "0x10", "baseFeePerGas": "0x3b9aca00" }),
        Some("eth_getTransactionByHash") if req["params"][0] == known => json!({
            "hash": known,
            "from": "0x1111111111111111111111111111111111111111",
            "to": null,
            "value": "0x0",
            "input": "0x6080",
            "gas": "0x186a0"
        }),
        _ => Value::Null,
    };
    Json(json!({ "jsonrpc": "2.0", "id": req["id"], "result": result }))
}

/// App whose HTTP RPC endpoint is a local `fake_node`
async fn test_app_with_node() -> TestApp {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let _ = axum::serve(listener, Router::new().route("/", post(fake_node))).await;
    });

    let network = NetworkConfig {
        http_url: url,
        ..test_network(&["wss://a"])
    };
    test_app_with(Arc::new(EndpointRegistry::new(vec![network], "sepolia")))
}

async fn seed_key(store: &InMemoryQuotaStore, raw: &str, plan: &str, status: AccountStatus, usage: u64) {
    let account = Account::new(format!("{}@example.com", plan), status);
    store.upsert_account(account.clone()).await.unwrap();
    let record = register_raw_key(store, account.id, raw, "test", plan).await.unwrap();
    store.set_usage(record.id, usage);
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn classify_request(key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/classify")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    let body = json!({
        "from": "0x1111111111111111111111111111111111111111",
        "data": "0x6080",
        "gas_limit": 100000
    });
    builder.body(Body::from(body.to_string())).unwrap()
}

fn header(response: &axum::response::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app();
    for uri in ["/health", "/v1/health"] {
        let response = app
            .router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
    }
}

#[tokio::test]
async fn test_networks_listing() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/networks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["default_network"], "sepolia");
    assert_eq!(body["data"]["networks"][0]["id"], "sepolia");
    assert_eq!(body["data"]["networks"][0]["chain_id"], 11155111);
    assert_eq!(app.connector.open_connections(), 0);
}

#[tokio::test]
async fn test_missing_key_is_401_with_guidance() {
    let app = test_app();
    let response = app.router.clone().oneshot(classify_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_KEY_REQUIRED");
    assert!(body["error"]["message"].as_str().unwrap().contains("X-API-Key"));
}

#[tokio::test]
async fn test_unknown_key_is_401() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(classify_request(Some("sg_does_not_exist")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "AUTH_INVALID_KEY");
}

#[tokio::test]
async fn test_banned_account_is_401_naming_status() {
    let app = test_app();
    seed_key(&app.store, "sg_banned_key", "pro", AccountStatus::Banned, 0).await;

    let response = app.router.clone().oneshot(classify_request(Some("sg_banned_key"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_ACCOUNT_INACTIVE");
    assert!(body["error"]["message"].as_str().unwrap().contains("banned"));
}

#[tokio::test]
async fn test_exhausted_demo_key_is_429() {
    let app = test_app();
    seed_key(&app.store, "sg_demo_spent", "demo", AccountStatus::Active, 100).await;

    let response = app.router.clone().oneshot(classify_request(Some("sg_demo_spent"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"]["code"], "QUOTA_LIMIT_REACHED");
}

#[tokio::test]
async fn test_accepted_call_carries_rate_limit_headers() {
    let app = test_app();
    seed_key(&app.store, "sg_starter_key", "starter", AccountStatus::Active, 0).await;

    let response = app.router.clone().oneshot(classify_request(Some("sg_starter_key"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("1000"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("999"));
    assert_eq!(header(&response, "x-ratelimit-plan").as_deref(), Some("Starter"));

    let body = body_json(response).await;
    assert_eq!(body["data"]["risk_score"], 30);
    assert_eq!(body["data"]["risk_level"], "MEDIUM");
    assert_eq!(body["data"]["calldata_prefix"], "0x6080");
}

#[tokio::test]
async fn test_query_parameter_key_and_unlimited_plan() {
    let app = test_app();
    seed_key(&app.store, "sg_enterprise_key", "enterprise", AccountStatus::Active, 5_000_000).await;

    let request = Request::post("/v1/classify?api_key=sg_enterprise_key")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "from": "0x1111111111111111111111111111111111111111", "to": "0x2222222222222222222222222222222222222222" })
                .to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("unlimited"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("unlimited"));
}

#[tokio::test]
async fn test_malformed_address_is_400() {
    let app = test_app();
    seed_key(&app.store, "sg_pro_key", "pro", AccountStatus::Active, 0).await;

    let request = Request::get("/v1/networks/sepolia/address/0xnot-an-address")
        .header("X-API-Key", "sg_pro_key")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "API_BAD_REQUEST");
}

#[tokio::test]
async fn test_simulate_forwards_to_engine() {
    let app = test_app();
    seed_key(&app.store, "sg_sim_key", "pro", AccountStatus::Active, 0).await;

    let request = Request::post("/v1/simulate")
        .header("X-API-Key", "sg_sim_key")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "value": "0x0de0b6b3a7640000",
                "data": "0x095ea7b3"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["record"]["verdict"], "safe");
    assert_eq!(body["data"]["steps"], 3);

    let seen = app.simulator.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].value_wei, "1000000000000000000");
    assert_eq!(seen[0].data, "0x095ea7b3");
    assert_eq!(seen[0].network, "sepolia");
    assert_eq!(seen[0].rpc_url.as_deref(), Some("http://127.0.0.1:9"));
    assert_eq!(seen[0].engine_args().unwrap()[9], "1");
}

#[tokio::test]
async fn test_stream_emits_ndjson_and_releases_session() {
    let app = test_app();
    app.connector.chain.insert(PendingTxEvent {
        to: None,
        ..plain_transfer(9)
    });

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/stream/sepolia").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type").as_deref(), Some("application/x-ndjson"));
    assert_eq!(app.state.sessions.active_sessions(), 1);

    app.connector.feed(0).send(Ok(hash(9))).unwrap();
    app.connector.hang_up();

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let lines: Vec<Value> = String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["type"], "connected");
    assert_eq!(lines[1]["type"], "tx");
    assert_eq!(lines[1]["risk_reasons"][0], "Contract creation");
    assert_eq!(lines[2]["type"], "error");
    assert_eq!(lines[2]["code"], "WS_STREAM_CLOSED");

    // body finished: the session and its socket are gone
    assert_eq!(app.state.sessions.active_sessions(), 0);
    assert_eq!(app.connector.open_connections(), 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "API_NOT_FOUND");
}

#[tokio::test]
async fn test_graceful_shutdown_ends_live_feeds() {
    let TestApp {
        router,
        connector,
        state,
        ..
    } = test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let sessions = state.sessions.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
                sessions.shutdown();
            })
            .await
    });

    let mut response = reqwest::get(format!("http://{}/v1/stream/sepolia", addr)).await.unwrap();
    let first = response.chunk().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("\"connected\""));
    assert_eq!(connector.open_connections(), 1);

    stop_tx.send(()).unwrap();
    let finished = tokio::time::timeout(std::time::Duration::from_secs(3), server).await;
    assert!(finished.is_ok(), "server still waiting on the live feed");
    assert!(finished.unwrap().unwrap().is_ok());

    assert_eq!(state.sessions.active_sessions(), 0);
    assert_eq!(connector.open_connections(), 0);
    // aborted heartbeat tasks unwind on the runtime
    for _ in 0..50 {
        if state.factory.live_heartbeats() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(state.factory.live_heartbeats(), 0);
}

#[tokio::test]
async fn test_stream_refused_while_shutting_down() {
    let app = test_app();
    app.state.sessions.shutdown();

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/stream/sepolia").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["code"], "API_UNAVAILABLE");
    assert_eq!(app.connector.open_connections(), 0);
}

#[tokio::test]
async fn test_tx_lookup_classifies_upstream_transaction() {
    let app = test_app_with_node().await;
    seed_key(&app.store, "sg_lookup_key", "pro", AccountStatus::Active, 0).await;

    let request = Request::get(format!("/v1/networks/sepolia/tx/{:#x}", hash(7)))
        .header("X-API-Key", "sg_lookup_key")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["hash"], format!("{:#x}", hash(7)));
    assert_eq!(body["data"]["risk_score"], 30);
    assert_eq!(body["data"]["risk_reasons"][0], "Contract creation");
    assert_eq!(body["data"]["gas_limit"], 100000);

    let request = Request::get(format!("/v1/networks/sepolia/tx/{:#x}", hash(8)))
        .header("X-API-Key", "sg_lookup_key")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "API_NOT_FOUND");

    let request = Request::get("/v1/networks/sepolia/tx/0x1234")
        .header("X-API-Key", "sg_lookup_key")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gas_reports_upstream_chain_id() {
    let app = test_app_with_node().await;
    seed_key(&app.store, "sg_gas_key", "pro", AccountStatus::Active, 0).await;

    let request = Request::get("/v1/networks/sepolia/gas")
        .header("X-API-Key", "sg_gas_key")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["chain_id"], 11155111);
    assert_eq!(body["data"]["block_number"], 16);
    assert_eq!(body["data"]["gas_price_gwei"], 2.5);
    assert_eq!(body["data"]["base_fee_gwei"], 1.0);
}

#[tokio::test]
async fn test_stats_lists_open_sessions() {
    let app = test_app();
    let feed = app
        .router
        .clone()
        .oneshot(Request::get("/v1/stream/sepolia").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(feed.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["sessions"][0]["network"], "sepolia");
    assert_eq!(body["data"]["live_heartbeats"], 1);

    drop(feed);
    assert_eq!(app.state.sessions.active_sessions(), 0);
}
