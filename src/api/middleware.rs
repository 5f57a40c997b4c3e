//! API Middleware (Key gating, Logging)

use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::handlers::AppState;
use super::types::{failure, ApiError, ApiResponse};
use crate::core::Verdict;
use crate::models::ErrorCode;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY: &str = "api_key";

/// Header wins over the query parameter
fn presented_key<'a>(headers: &'a HeaderMap, query: &'a HashMap<String, String>) -> Option<&'a str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| query.get(API_KEY_QUERY).map(String::as_str))
}

/// Gate protected routes on a valid, non-exhausted key
pub async fn api_key_middleware(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let verdict = match state.gateway.validate(presented_key(&headers, &query)).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(path = %request.uri().path(), "Quota store failure: {}", e);
            return failure(&e, start.elapsed().as_secs_f64() * 1000.0).into_response();
        }
    };

    let key = match verdict {
        Verdict::Valid(key) => key,
        Verdict::Rejected(rejection) => {
            let code = rejection.code();
            let status = axum::http::StatusCode::from_u16(code.http_status())
                .unwrap_or(axum::http::StatusCode::UNAUTHORIZED);
            let body = ApiResponse::error(ApiError::from(&rejection), start.elapsed().as_secs_f64() * 1000.0);
            if code == ErrorCode::QuotaLimitReached {
                warn!(path = %request.uri().path(), "Plan limit reached");
            }
            return (status, Json(body)).into_response();
        }
    };

    let headers_out = key.rate_limit_headers();
    request.extensions_mut().insert(key);

    let mut response = next.run(request).await;
    for (name, value) in headers_out {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(HeaderName::from_static(name), value);
        }
    }
    response
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    // the query string may carry an API key, so only the path is logged
    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        latency_ms = %start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_beats_query() {
        let mut headers = HeaderMap::new();
        let mut query = HashMap::new();
        assert_eq!(presented_key(&headers, &query), None);

        query.insert(API_KEY_QUERY.to_string(), "sg_from_query".to_string());
        assert_eq!(presented_key(&headers, &query), Some("sg_from_query"));

        headers.insert("X-API-Key", HeaderValue::from_static("sg_from_header"));
        assert_eq!(presented_key(&headers, &query), Some("sg_from_header"));
    }
}
