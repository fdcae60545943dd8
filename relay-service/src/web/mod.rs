//! Web server module.
//!
//! - Queue management routes, guarded by the identity check
//! - The internal delivery callback, guarded by the shared token
//! - Status and inbound webhooks
//! - Static root, health and metrics endpoints

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use auth::{require_identity, ApplicationIdentityVerifier, IdentityVerifier};
pub use handlers::{
    create_queue, delete_queue, enqueue_item, health, inbound_webhook, metrics, queue_delivery,
    root, status_webhook, ApiError, AppState, CreateQueueRequest, CreateQueueResponse,
    SuccessResponse,
};

/// Build the full router for `state`.
pub fn router(state: AppState) -> Router {
    let management = Router::new()
        .route("/queues/create", post(create_queue))
        .route("/queues/additem/:name", post(enqueue_item))
        .route("/queues/:name", delete(delete_queue))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity));

    Router::new()
        .route("/", get(root))
        .route("/_/health", get(health))
        .route("/_/metrics", get(metrics))
        .route("/queues/:name", post(queue_delivery))
        .route("/webhooks/status", post(status_webhook))
        .route("/webhooks/inbound", post(inbound_webhook))
        .merge(management)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
