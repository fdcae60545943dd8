//! HTTP endpoint handlers.
//!
//! Handlers only extract fields and map outcomes to responses; the relay
//! semantics live in [`crate::relay`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::forward::Forwarder;
use crate::queue::{QueueBackend, QueueItem};
use crate::relay::{Dispatcher, InboundGateway, RelayWorker, StatusRelay};
use crate::store::CorrelationStore;
use crate::web::auth::IdentityVerifier;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub worker: RelayWorker,
    pub gateway: InboundGateway,
    pub status: StatusRelay,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        backend: Arc<dyn QueueBackend>,
        store: Arc<dyn CorrelationStore>,
        forwarder: Arc<dyn Forwarder>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            dispatcher: Dispatcher::new(backend, store.clone(), config.clone()),
            worker: RelayWorker::new(forwarder.clone(), config.clone()),
            gateway: InboundGateway::new(forwarder.clone(), config.clone()),
            status: StatusRelay::new(store, forwarder, config),
            identity,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Plain success acknowledgement.
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// Failure response: `{success: false, error: "Error occurred (<hint>)", detail?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    hint: &'static str,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, hint: &'static str) -> Self {
        Self {
            status,
            hint,
            detail: None,
        }
    }

    /// Queue management routes answer every failure with a 500; only
    /// request problems are echoed as detail.
    fn queue(err: RelayError, hint: &'static str) -> Self {
        error!(error = %err, hint = hint, "queue_route_failed");
        let detail = match &err {
            RelayError::Validation(fields) => Some(format!("missing required field: {}", fields)),
            RelayError::Invalid(_) => Some(err.to_string()),
            _ => None,
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            hint,
            detail,
        }
    }

    /// Webhook routes map each error kind to its own status.
    fn relay(err: RelayError, hint: &'static str) -> Self {
        let status = match &err {
            RelayError::Validation(_) | RelayError::Invalid(_) | RelayError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::Auth(_) => StatusCode::UNAUTHORIZED,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status_code = status.as_u16(), error = %err, hint = hint, "webhook_failed");
        let detail = match err {
            RelayError::Auth(_) => None,
            other => Some(other.to_string()),
        };
        Self {
            status,
            hint,
            detail,
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": format!("Error occurred ({})", self.hint),
        });
        if let Some(detail) = &self.detail {
            body["detail"] = Value::String(detail.clone());
        }
        body
    }
}

/// A body axum could not read as JSON (bad syntax, wrong content type).
fn unreadable(rejection: JsonRejection) -> RelayError {
    RelayError::Invalid(rejection.body_text())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

// =============================================================================
// Static endpoints
// =============================================================================

pub async fn root() -> &'static str {
    "App is running."
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn metrics() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// Queue management
// =============================================================================

/// Limits arrive as numbers or numeric strings; blanks count as unset.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueueRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_limit")]
    pub max_inflight: Option<u32>,
    #[serde(default, deserialize_with = "lenient_limit")]
    pub msg_per_second: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Limit {
    Number(u32),
    Text(String),
}

fn lenient_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Option::<Limit>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Limit::Number(n)) => Ok(Some(n)),
        Some(Limit::Text(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Limit::Text(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("{:?} is not a whole number", raw))),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueueResponse {
    pub success: bool,
    pub name: String,
    pub max_inflight: u32,
    pub msg_per_second: u32,
}

pub async fn create_queue(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateQueueResponse>), ApiError> {
    const HINT: &str = "Creating a new queue.";

    let Json(body) = body.map_err(|r| ApiError::queue(unreadable(r), HINT))?;
    let req: CreateQueueRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::queue(RelayError::Invalid(e.to_string()), HINT))?;

    info!(queue = %req.name, "create_queue_received");

    let definition = state
        .dispatcher
        .create_queue(&req.name, req.max_inflight, req.msg_per_second)
        .await
        .map_err(|e| ApiError::queue(e, HINT))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateQueueResponse {
            success: true,
            name: definition.name,
            max_inflight: definition.max_inflight,
            msg_per_second: definition.msg_per_second,
        }),
    ))
}

/// Enqueue the request body; `to` and `status_url` are required.
pub async fn enqueue_item(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(payload) =
        payload.map_err(|r| ApiError::queue(unreadable(r), "Adding queue item."))?;
    let to = string_field(&payload, "to");
    let status_url = string_field(&payload, "status_url");

    info!(queue = %name, has_to = !to.is_empty(), "enqueue_item_received");

    state
        .dispatcher
        .enqueue_item(&name, &to, &status_url, payload)
        .await
        .map_err(|e| ApiError::queue(e, "Adding queue item."))?;

    Ok(SuccessResponse::ok())
}

pub async fn delete_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .dispatcher
        .delete_queue(&name)
        .await
        .map_err(|e| ApiError::queue(e, "Nothing to delete."))?;

    Ok(SuccessResponse::ok())
}

/// Called by the queue backend for each delivery.
///
/// The body is parsed leniently so that any shape still meets the token gate.
pub async fn queue_delivery(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    info!(queue = %name, "queue_delivery_received");

    let item: QueueItem = serde_json::from_slice(&body)
        .unwrap_or_else(|_| QueueItem::new(Value::Null, String::new()));

    match state.worker.handle(&name, item).await {
        Ok(_) => SuccessResponse::ok().into_response(),
        Err(RelayError::Auth(_)) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "Unauthorized."})),
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SuccessResponse { success: false }),
        )
            .into_response(),
    }
}

// =============================================================================
// Webhooks
// =============================================================================

pub async fn status_webhook(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    const HINT: &str = "Relaying status.";

    let Json(payload) = payload.map_err(|r| ApiError::relay(unreadable(r), HINT))?;
    let Value::Object(status) = payload else {
        return Err(ApiError::relay(RelayError::Validation("to".to_string()), HINT));
    };

    state
        .status
        .relay(status)
        .await
        .map_err(|e| ApiError::relay(e, HINT))?;

    Ok(SuccessResponse::ok())
}

pub async fn inbound_webhook(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(r) => return ApiError::relay(unreadable(r), "Relaying inbound message.").into_response(),
    };

    match state.gateway.relay(&payload).await {
        Ok(resp) => {
            let mut body = json!({"success": true});
            body["firstDestinationResponse"] = resp.first_destination_response;
            body["secondDestinationResponse"] = resp.second_destination_response;
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(failure) => {
            error!(error = %failure.error, "inbound_relay_failed");
            let mut body = json!({
                "success": false,
                "error": "Error occurred (Relaying inbound message.)",
                "detail": failure.error.to_string(),
            });
            if let Some(first) = failure.first {
                body["firstDestinationResponse"] = json!(first);
            }
            if let Some(second) = failure.second {
                body["secondDestinationResponse"] = json!(second);
            }
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// A string field of a JSON object, empty when absent or not a string.
fn string_field(payload: &Value, field: &str) -> String {
    payload
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
