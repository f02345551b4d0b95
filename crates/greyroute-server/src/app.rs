//! Gateway application state and routes
//!
//! The gateway classifies every business call with the [`GreyEngine`] and
//! forwards it either to the grey target or to the default upstream. It also
//! exposes the strategy document for inspection and manual updates.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use greyroute_core::{ApiIdentify, Dimension, Dimensions, Error as CoreError, StrategyRepository};
use greyroute_observability::{HealthState, Metrics, health_router};
use greyroute_routing::{AppStrategy, GreyEngine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Shared state for the gateway handlers
#[derive(Clone)]
pub struct AppState {
    engine: GreyEngine,
    repository: Arc<dyn StrategyRepository>,
    client: reqwest::Client,
    /// `host:port` for traffic that is not grey
    default_upstream: String,
}

impl AppState {
    pub fn new(
        engine: GreyEngine,
        repository: Arc<dyn StrategyRepository>,
        default_upstream: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            repository,
            client: reqwest::Client::new(),
            default_upstream: default_upstream.into(),
        }
    }
}

/// Build the gateway router, including the health and metrics endpoints
pub fn router(state: AppState, metrics: Arc<Metrics>) -> Router {
    let health_state =
        HealthState::with_readiness_checker(metrics, Arc::new(state.engine.clone()));

    Router::new()
        .route("/grey/strategy/json", get(get_strategy).put(put_strategy))
        .route("/api/{version}/business/{identify}", any(forward_business))
        .with_state(state)
        .merge(health_router(health_state))
}

/// Error body returned by the gateway's own endpoints
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::Parse(_) | CoreError::ConfigValidation(_) => StatusCode::BAD_REQUEST,
            CoreError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            CoreError::FetchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Fetch(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReloadResponse {
    applied: bool,
    version: i64,
}

async fn get_strategy(State(state): State<AppState>) -> Result<Response, ApiError> {
    let document = state.repository.fetch().await?;
    Ok((
        [(header::CONTENT_TYPE, "application/json; charset=UTF-8")],
        document,
    )
        .into_response())
}

async fn put_strategy(
    State(state): State<AppState>,
    document: String,
) -> Result<Json<ReloadResponse>, ApiError> {
    // Reject documents the engine could never load before they reach the repository
    AppStrategy::from_json(&document)?;

    state.repository.store(document).await?;
    let outcome = state.engine.force_reload().await?;
    info!("Strategy pushed via API: {:?}", outcome);

    Ok(Json(ReloadResponse {
        applied: outcome.is_applied(),
        version: outcome.current_version(),
    }))
}

/// Business identifiers carried in the request body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusinessParams {
    #[serde(default, deserialize_with = "lenient_string")]
    store_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    ins_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    terminal_id: String,
}

/// Keep string values; anything else (number, null, object) reads as empty
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Ok(value),
        _ => Ok(String::new()),
    }
}

impl BusinessParams {
    /// Missing, empty or non-JSON bodies yield empty dimension values;
    /// a mistyped field only empties that field
    fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    fn into_dimensions(self, version: String) -> Dimensions {
        let mut dimensions = Dimensions::new();
        dimensions.insert(Dimension::version(), version);
        dimensions.insert(Dimension::store_id(), self.store_id);
        dimensions.insert(Dimension::ins_code(), self.ins_code);
        dimensions.insert(Dimension::terminal_id(), self.terminal_id);
        dimensions
    }
}

async fn forward_business(
    State(state): State<AppState>,
    Path((version, identify)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> Response {
    let api = ApiIdentify::new(identify);
    let dimensions = BusinessParams::from_body(&body).into_dimensions(version);
    let decision = state.engine.classify(&api, &dimensions);

    let authority = decision
        .authority()
        .unwrap_or_else(|| state.default_upstream.clone());
    debug!(
        "api={} dimensions={:?} grey={} -> {}",
        api, dimensions, decision.is_grey, authority
    );

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let target = format!("http://{}{}", authority, path_and_query);

    headers.remove(header::HOST);
    let upstream = match state
        .client
        .request(method, &target)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!("Forwarding to {} failed: {}", target, e);
            return ApiError::new(StatusCode::BAD_GATEWAY, format!("upstream {}: {}", authority, e))
                .into_response();
        }
    };

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Reading response from {} failed: {}", target, e);
            return ApiError::new(StatusCode::BAD_GATEWAY, format!("upstream {}: {}", authority, e))
                .into_response();
        }
    };

    // Framing headers are recomputed for the buffered body
    response_headers.remove(header::TRANSFER_ENCODING);
    response_headers.remove(header::CONTENT_LENGTH);
    response_headers.remove(header::CONNECTION);

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{DEMO_STRATEGY, MemoryStrategyRepository};
    use crate::upstream;
    use axum::http::Request;
    use greyroute_routing::RefresherConfig;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    async fn spawn_upstream() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, upstream::router(port)).await.unwrap();
        });
        port
    }

    async fn gateway(document: &str, default_upstream: &str) -> (Router, Arc<MemoryStrategyRepository>) {
        let repository = Arc::new(MemoryStrategyRepository::new(document));
        let engine = GreyEngine::new(repository.clone());
        engine
            .initialize(RefresherConfig::new(Duration::from_secs(60)))
            .await
            .unwrap();

        let state = AppState::new(engine, repository.clone(), default_upstream);
        (router(state, Arc::new(Metrics::new().unwrap())), repository)
    }

    fn grey_strategy(version: i64, grey_port: u16) -> String {
        format!(
            r#"{{
                "version": {version},
                "enable": true,
                "host": "127.0.0.1",
                "port": {grey_port},
                "apis": {{
                    "online-json-direct": {{
                        "enable": true,
                        "rules": [{{
                            "version": {{"type": "in", "args": ["v1"]}},
                            "storeId": {{"type": "in", "args": ["SID000001"]}}
                        }}]
                    }}
                }}
            }}"#
        )
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_get_strategy_returns_document() {
        let (app, _) = gateway(DEMO_STRATEGY, "127.0.0.1:8083").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/grey/strategy/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=UTF-8"
        );
        assert_eq!(body_string(response).await, DEMO_STRATEGY);
    }

    #[tokio::test]
    async fn test_put_strategy_applies_newer_version() {
        let (app, repository) = gateway(&grey_strategy(1, 9000), "127.0.0.1:8083").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/grey/strategy/json")
                    .body(Body::from(grey_strategy(2, 9001)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let reload: ReloadResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(reload.applied);
        assert_eq!(reload.version, 2);
        assert_eq!(repository.fetch().await.unwrap(), grey_strategy(2, 9001));
    }

    #[tokio::test]
    async fn test_put_strategy_reports_stale_version() {
        let (app, _) = gateway(&grey_strategy(5, 9000), "127.0.0.1:8083").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/grey/strategy/json")
                    .body(Body::from(grey_strategy(3, 9001)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let reload: ReloadResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(!reload.applied);
        assert_eq!(reload.version, 5);
    }

    #[tokio::test]
    async fn test_put_malformed_strategy_is_rejected() {
        let (app, repository) = gateway(&grey_strategy(1, 9000), "127.0.0.1:8083").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/grey/strategy/json")
                    .body(Body::from("{\"version\": "))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // The repository still holds the previous document
        assert_eq!(repository.fetch().await.unwrap(), grey_strategy(1, 9000));
    }

    #[tokio::test]
    async fn test_business_call_is_routed_by_decision() {
        let grey_port = spawn_upstream().await;
        let normal_port = spawn_upstream().await;
        let (app, _) = gateway(
            &grey_strategy(1, grey_port),
            &format!("127.0.0.1:{}", normal_port),
        )
        .await;

        // Matches the grey rule
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/business/online-json-direct")
                    .body(Body::from(r#"{"storeId": "SID000001"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            format!(
                "response /api/v1/business/online-json-direct by server(port: {})",
                grey_port
            )
        );

        // Wrong version falls through to the default upstream
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v2/business/online-json-direct")
                    .body(Body::from(r#"{"storeId": "SID000001"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_string(response).await,
            format!(
                "response /api/v2/business/online-json-direct by server(port: {})",
                normal_port
            )
        );
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let (app, _) = gateway(&grey_strategy(1, 9000), "127.0.0.1:1").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v9/business/unknown-api")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_readyz_reports_loaded_version() {
        let (app, _) = gateway(&grey_strategy(7, 9000), "127.0.0.1:8083").await;

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["strategy_version"], 7);
    }

    #[test]
    fn test_business_params_from_body() {
        let dimensions =
            BusinessParams::from_body(br#"{"storeId": "S1", "insCode": null, "extra": 1}"#)
                .into_dimensions("v1".to_string());
        assert_eq!(dimensions[&Dimension::version()], "v1");
        assert_eq!(dimensions[&Dimension::store_id()], "S1");
        assert_eq!(dimensions[&Dimension::ins_code()], "");
        assert_eq!(dimensions[&Dimension::terminal_id()], "");

        let dimensions = BusinessParams::from_body(b"not json").into_dimensions("v2".to_string());
        assert_eq!(dimensions[&Dimension::store_id()], "");

        let dimensions = BusinessParams::from_body(b"[1, 2]").into_dimensions("v2".to_string());
        assert_eq!(dimensions[&Dimension::ins_code()], "");
    }

    #[test]
    fn test_mistyped_field_keeps_the_others() {
        let dimensions = BusinessParams::from_body(
            br#"{"storeId": 123, "insCode": "INS000001", "terminalId": {"id": "T1"}}"#,
        )
        .into_dimensions("v3".to_string());

        assert_eq!(dimensions[&Dimension::store_id()], "");
        assert_eq!(dimensions[&Dimension::ins_code()], "INS000001");
        assert_eq!(dimensions[&Dimension::terminal_id()], "");
    }
}
