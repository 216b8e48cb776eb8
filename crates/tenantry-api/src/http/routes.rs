//! HTTP route definitions and handlers.

use std::future::Future;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::warn;

use tenantry_domain::{Credentials, RequestContext};
use tenantry_remote::Product;
use tenantry_server::handlers::products::{LookupResult, ProductLookupRequest};

use super::state::AppState;
use crate::errors::{error_codes, ApiError, ApiResult};
use crate::middleware::{
    cors_layer, MetricsLayer, RequestId, RequestIdLayer, RequestLoggingLayer, RequestMetrics,
};
use crate::observability::{metrics_handler, MetricsState};

/// JSON extractor that rejects malformed bodies with 400 instead of 422.
///
/// Body limit violations stay 413.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    Err(ApiError::new(error_codes::PAYLOAD_TOO_LARGE, message))
                } else {
                    Err(ApiError::validation_error(message))
                }
            }
        }
    }
}

/// Default request body size limit (1MB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Default path prefix of the product API.
pub const DEFAULT_ENDPOINT: &str = "/v1";

fn api_routes(endpoint: &str) -> Router<Arc<AppState>> {
    let prefix = endpoint.trim_end_matches('/');
    Router::new()
        .route(&format!("{prefix}/products/lookup"), post(lookup_products))
        .route(&format!("{prefix}/products/:id"), get(get_product))
}

/// Creates the router with the product API under [`DEFAULT_ENDPOINT`].
pub fn create_router(state: AppState) -> Router {
    create_router_with_endpoint(state, DEFAULT_ENDPOINT)
}

/// Creates the router with the product API under `endpoint`.
pub fn create_router_with_endpoint(state: AppState, endpoint: &str) -> Router {
    let request_metrics = Arc::clone(&state.request_metrics);
    let router = app_routes(state, endpoint);
    with_middleware(router, request_metrics)
}

/// Creates the router with the product API under `endpoint` plus `/metrics`.
pub fn create_router_with_observability(
    state: AppState,
    metrics_state: MetricsState,
    endpoint: &str,
) -> Router {
    let request_metrics = Arc::clone(&state.request_metrics);

    let observability_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_state);

    let router = app_routes(state, endpoint).merge(observability_router);
    with_middleware(router, request_metrics)
}

fn app_routes(state: AppState, endpoint: &str) -> Router {
    api_routes(endpoint)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(Arc::new(state))
        .layer(RequestBodyLimitLayer::new(DEFAULT_BODY_LIMIT))
}

fn with_middleware(router: Router, request_metrics: Arc<RequestMetrics>) -> Router {
    // Last layer runs first.
    router
        .layer(RequestLoggingLayer::new())
        .layer(MetricsLayer::new(request_metrics))
        .layer(cors_layer())
        .layer(RequestIdLayer::new())
}

// ============================================================
// Request context
// ============================================================

/// Derives the request context from the inbound headers.
///
/// A missing `Authorization` header is the anonymous tenant; one that is not
/// valid visible ASCII is rejected.
fn request_context(
    headers: &HeaderMap,
    request_id: Option<Extension<RequestId>>,
) -> ApiResult<RequestContext> {
    let authorization = headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str())
        .transpose()
        .map_err(|_| ApiError::validation_error("authorization header is not valid ASCII"))?;
    let credentials = Credentials::from_authorization(authorization);

    Ok(match request_id {
        Some(Extension(id)) => RequestContext::with_id(id.0, credentials),
        None => RequestContext::new(credentials),
    })
}

/// Runs `work` with `ctx` bound as the current request.
///
/// The request's token is cancelled when the time limit passes or when the
/// connection goes away and this future is dropped.
async fn serve<T, F>(state: &AppState, ctx: RequestContext, work: F) -> ApiResult<T>
where
    F: Future<Output = LookupResult<T>>,
{
    let guard = ctx.cancel.clone().drop_guard();
    let request_id = ctx.request_id.clone();

    match tokio::time::timeout(state.request_timeout, ctx.scope(work)).await {
        Ok(outcome) => {
            let _ = guard.disarm();
            outcome.map_err(ApiError::from)
        }
        Err(_) => {
            warn!(
                request_id = %request_id,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "request timed out"
            );
            Err(ApiError::timeout(format!(
                "request exceeded {}ms",
                state.request_timeout.as_millis()
            )))
        }
    }
}

// ============================================================
// Product API
// ============================================================

async fn get_product(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    let ctx = request_context(&headers, request_id)?;
    let product = serve(&state, ctx, state.handler.get_current_product(&id)).await?;
    Ok(Json(product))
}

/// Body of `POST {endpoint}/products/lookup`.
#[derive(Debug, Deserialize)]
pub struct LookupRequestBody {
    pub ids: Vec<String>,
}

/// One entry of the lookup response, carrying either the product or the
/// error for that id.
#[derive(Debug, Serialize)]
pub struct LookupItemBody {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize)]
pub struct LookupResponseBody {
    pub results: Vec<LookupItemBody>,
}

async fn lookup_products(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    JsonBadRequest(body): JsonBadRequest<LookupRequestBody>,
) -> ApiResult<Json<LookupResponseBody>> {
    let ctx = request_context(&headers, request_id)?;
    let request = ProductLookupRequest::new(body.ids);
    let response = serve(&state, ctx, state.handler.lookup_current(request)).await?;

    let results = response
        .results
        .into_iter()
        .map(|item| match item.result {
            Ok(product) => LookupItemBody {
                id: item.id,
                product: Some(product),
                error: None,
            },
            Err(err) => LookupItemBody {
                id: item.id,
                product: None,
                error: Some(err.into()),
            },
        })
        .collect();

    Ok(Json(LookupResponseBody { results }))
}

// ============================================================
// Health
// ============================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe. Reports 503 once shutdown has begun.
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache = state.handler.cache();
    let stats = cache.stats();
    let tenants = serde_json::json!({
        "ready": stats.ready,
        "building": stats.building,
        "active_leases": stats.active_leases,
    });

    if cache.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "shutting_down", "tenants": tenants })),
        )
    } else {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready", "tenants": tenants })),
        )
    }
}
