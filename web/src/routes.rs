//! Router assembly.

use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    body::Body,
    http::Request,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Header carrying the per-request id, generated when the client sends none.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router.
///
/// # Routes
///
/// - `GET /health` - Liveness
/// - `GET /ready` - Store ping
/// - `GET /metrics` - Prometheus text
/// - `GET /raffle/:slug` - Raffle and taken numbers
/// - `POST /purchase` - Reserve numbers
/// - `POST /purchases/:id/confirm` - Manual payment confirmation
/// - `POST /purchases/:id/cancel` - Organizer cancellation
/// - `POST /webhooks/:provider` - Payment provider webhook
///
/// Requests slower than `request_timeout` answer 408.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id());

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/raffle/:slug", get(handlers::get_raffle))
        .route("/purchase", post(handlers::create_purchase))
        .route("/purchases/:id/confirm", post(handlers::confirm_purchase))
        .route("/purchases/:id/cancel", post(handlers::cancel_purchase))
        .route("/webhooks/:provider", post(handlers::receive_webhook))
        .with_state(state)
        .layer(middleware)
}
