//! Pass-through authentication against the identity API.
//!
//! A caller is accepted when its `Authorization` header can read this
//! deployment's own application record. Only the credentials that own the
//! application can do that.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::RelayError;
use crate::web::handlers::{ApiError, AppState};

/// Decides whether a caller's credentials are acceptable.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, authorization: Option<&str>) -> Result<(), RelayError>;
}

#[derive(Deserialize)]
struct ApplicationRecord {
    #[serde(default)]
    id: Option<String>,
}

/// [`IdentityVerifier`] backed by `GET /v2/applications/{id}`.
#[derive(Clone)]
pub struct ApplicationIdentityVerifier {
    client: Client,
    api_url: String,
    application_id: Option<String>,
    timeout: Option<Duration>,
}

impl ApplicationIdentityVerifier {
    pub fn new(
        client: Client,
        api_url: &str,
        application_id: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            application_id,
            timeout,
        }
    }
}

#[async_trait]
impl IdentityVerifier for ApplicationIdentityVerifier {
    async fn verify(&self, authorization: Option<&str>) -> Result<(), RelayError> {
        let application_id = self
            .application_id
            .as_deref()
            .ok_or_else(|| RelayError::Auth("application id not configured".to_string()))?;

        let mut request = self
            .client
            .get(format!("{}/v2/applications/{}", self.api_url, application_id));
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION.as_str(), value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("identity api unreachable: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status_code = status.as_u16(), "identity_check_rejected");
            return Err(RelayError::Auth("invalid api key and secret".to_string()));
        }

        let record: ApplicationRecord = resp
            .json()
            .await
            .map_err(|e| RelayError::Upstream(format!("identity api response: {}", e)))?;

        if record.id.as_deref() == Some(application_id) {
            Ok(())
        } else {
            warn!("identity_check_application_mismatch");
            Err(RelayError::Auth("invalid api key and secret".to_string()))
        }
    }
}

/// Middleware guarding the queue management routes.
pub async fn require_identity(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.identity.verify(authorization.as_deref()).await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            warn!(
                has_authorization = authorization.is_some(),
                error = %e,
                "auth_failed"
            );
            ApiError::new(StatusCode::UNAUTHORIZED, "Auth error.").into_response()
        }
    }
}
