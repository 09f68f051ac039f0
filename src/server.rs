//! Axum router construction for both HTTP surfaces.
//!
//! [`delivery_app`] builds the public delivery worker router
//! (`GET /?token=...`); [`grant_app`] builds the internal issuance
//! router (`POST /grant`).  They are served by separate binaries so the
//! grant surface is never reachable from the public edge.

use axum::{
    extract::{Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, DeliveryError, GrantError};
use crate::handlers::grant::{GrantBatchRequest, GrantRequest};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specifications ---------------------------------------------------

/// OpenAPI documentation for the delivery worker.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tollgate Delivery API",
        version = "0.1.0",
        description = "Token-gated object delivery"
    ),
    paths(health_check, crate::handlers::deliver::deliver_object),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Delivery", description = "Token-verified object delivery"),
    )
)]
struct DeliveryApiDoc;

/// OpenAPI documentation for the grant service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tollgate Grant API",
        version = "0.1.0",
        description = "Access-token issuance for the delivery worker"
    ),
    paths(
        health_check,
        crate::handlers::grant::grant_token,
        crate::handlers::grant::grant_token_batch,
    ),
    components(schemas(
        crate::handlers::grant::GrantRequest,
        crate::handlers::grant::GrantResponse,
        crate::handlers::grant::GrantBatchRequest,
        crate::handlers::grant::BatchToken,
        crate::handlers::grant::GrantBatchResponse,
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Grant", description = "Token issuance"),
    )
)]
struct GrantApiDoc;

// -- Routers ------------------------------------------------------------------

/// Build the public delivery router.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn delivery_app(state: Arc<AppState>) -> Router {
    let openapi = DeliveryApiDoc::openapi();

    // Objects are fetched by opaque token from browsers on other
    // origins; GET/HEAD with no credentials is all CORS ever needs
    // to allow here.
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::HEAD])
        .allow_origin(Any);

    Router::new()
        // Health check endpoint.
        .route("/health", get(health_check))
        // Prometheus metrics endpoint.
        .route("/metrics", get(metrics_handler))
        // The delivery surface: everything rides on the root path.
        .route("/", get(handle_get_delivery).head(handle_head_delivery))
        // OpenAPI document.
        .route("/openapi.json", get(move || async move { Json(openapi) }))
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // common_headers_middleware adds standard response headers.
        .layer(middleware::from_fn(common_headers_middleware))
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

/// Build the internal grant router.
pub fn grant_app(state: Arc<AppState>) -> Router {
    let openapi = GrantApiDoc::openapi();

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/grant", post(handle_grant))
        .route("/grant/batch", post(handle_grant_batch))
        .route("/openapi.json", get(move || async move { Json(openapi) }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `Tollgate`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Only set x-request-id if not already present (error responses set it).
    if !headers.contains_key("x-request-id") {
        let request_id = generate_request_id();
        headers.insert("x-request-id", HeaderValue::from_str(&request_id).unwrap());
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    // Always overwrite Date and Server to ensure consistency.
    headers.insert("date", HeaderValue::from_str(&date).unwrap());
    headers.insert("server", HeaderValue::from_static("Tollgate"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Delivery dispatch -------------------------------------------------------

/// Query parameters accepted by the delivery surface.  Anything beyond
/// `token` is ignored.
#[derive(Debug, Deserialize)]
struct DeliveryParams {
    token: Option<String>,
}

/// `GET /` -- stream the object named by the token.
async fn handle_get_delivery(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeliveryParams>,
) -> Result<Response, DeliveryError> {
    crate::handlers::deliver::deliver_object(state, params.token.as_deref(), true).await
}

/// `HEAD /` -- same verification and headers as GET, no body.
async fn handle_head_delivery(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeliveryParams>,
) -> Result<Response, DeliveryError> {
    crate::handlers::deliver::deliver_object(state, params.token.as_deref(), false).await
}

// -- Grant dispatch ----------------------------------------------------------

/// `POST /grant` -- mint one token.
async fn handle_grant(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GrantRequest>,
) -> Result<Response, GrantError> {
    crate::handlers::grant::grant_token(state, request).await
}

/// `POST /grant/batch` -- mint tokens for several keys.
async fn handle_grant_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GrantBatchRequest>,
) -> Result<Response, GrantError> {
    crate::handlers::grant::grant_token_batch(state, request).await
}
