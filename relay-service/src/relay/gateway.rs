//! Dual-destination relay for inbound payloads.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::config::{Config, InboundFailurePolicy};
use crate::error::{ForwardError, RelayError};
use crate::forward::Forwarder;

/// Outcome of forwarding to one destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardResult {
    pub destination: &'static str,
    pub status: ForwardStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardStatus {
    Ok,
    Failed,
}

impl ForwardResult {
    fn from_outcome(destination: &'static str, outcome: Result<Value, ForwardError>) -> Self {
        match outcome {
            Ok(body) => Self {
                destination,
                status: ForwardStatus::Ok,
                body: Some(body),
                error: None,
            },
            Err(e) => Self {
                destination,
                status: ForwardStatus::Failed,
                body: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ForwardStatus::Ok
    }
}

/// Both destinations answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundResponse {
    pub first_destination_response: Value,
    pub second_destination_response: Value,
}

/// At least one destination failed.
#[derive(Debug)]
pub struct InboundFailure {
    pub error: RelayError,
    pub first: Option<ForwardResult>,
    /// `None` when the second destination was never attempted.
    pub second: Option<ForwardResult>,
}

impl From<RelayError> for InboundFailure {
    fn from(error: RelayError) -> Self {
        Self {
            error,
            first: None,
            second: None,
        }
    }
}

/// Fans an inbound payload out to the two configured destinations, in order.
#[derive(Clone)]
pub struct InboundGateway {
    forwarder: Arc<dyn Forwarder>,
    config: Arc<Config>,
}

impl InboundGateway {
    pub fn new(forwarder: Arc<dyn Forwarder>, config: Arc<Config>) -> Self {
        Self { forwarder, config }
    }

    pub async fn relay(&self, payload: &Value) -> Result<InboundResponse, InboundFailure> {
        let (first_url, second_url) = match (
            self.config.inbound_primary_url.as_deref(),
            self.config.inbound_secondary_url.as_deref(),
        ) {
            (Some(first), Some(second)) => (first, second),
            _ => {
                error!("inbound_destinations_not_configured");
                return Err(RelayError::Config("inbound destinations".to_string()).into());
            }
        };

        let first = self.forward("first", first_url, payload).await;

        if !first.is_ok() && self.config.inbound_failure_policy == InboundFailurePolicy::ShortCircuit {
            return Err(InboundFailure {
                error: RelayError::Upstream(first.error.clone().unwrap_or_default()),
                first: Some(first),
                second: None,
            });
        }

        let second = self.forward("second", second_url, payload).await;

        match (first, second) {
            (
                ForwardResult {
                    body: Some(first_body),
                    ..
                },
                ForwardResult {
                    body: Some(second_body),
                    ..
                },
            ) => Ok(InboundResponse {
                first_destination_response: first_body,
                second_destination_response: second_body,
            }),
            (first, second) => {
                let detail = [&first, &second]
                    .iter()
                    .filter_map(|r| r.error.as_deref())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(InboundFailure {
                    error: RelayError::Upstream(detail),
                    first: Some(first),
                    second: Some(second),
                })
            }
        }
    }

    async fn forward(&self, destination: &'static str, url: &str, payload: &Value) -> ForwardResult {
        let outcome = self.forwarder.post_json(url, payload, &[]).await;

        let result = ForwardResult::from_outcome(destination, outcome);
        info!(
            destination = destination,
            ok = result.is_ok(),
            "inbound_forward_complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForwarder, Reply};
    use serde_json::json;

    const FIRST: &str = "https://one.example/inbound";
    const SECOND: &str = "https://two.example/inbound";

    fn gateway(forwarder: Arc<FakeForwarder>, policy: InboundFailurePolicy) -> InboundGateway {
        InboundGateway::new(
            forwarder,
            Arc::new(Config {
                inbound_primary_url: Some(FIRST.to_string()),
                inbound_secondary_url: Some(SECOND.to_string()),
                inbound_failure_policy: policy,
                ..Config::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_relays_to_both_in_order() {
        let forwarder = Arc::new(FakeForwarder::default());
        forwarder.reply(FIRST, Reply::Ok(json!({"from": "one"})));
        forwarder.reply(SECOND, Reply::Ok(json!({"from": "two"})));
        let gateway = gateway(forwarder.clone(), InboundFailurePolicy::ShortCircuit);

        let resp = gateway.relay(&json!({"text": "hello"})).await.unwrap();

        assert_eq!(resp.first_destination_response, json!({"from": "one"}));
        assert_eq!(resp.second_destination_response, json!({"from": "two"}));
        let urls: Vec<_> = forwarder.sent().into_iter().map(|f| f.url).collect();
        assert_eq!(urls, vec![FIRST.to_string(), SECOND.to_string()]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_second_destination() {
        let forwarder = Arc::new(FakeForwarder::default());
        forwarder.reply(FIRST, Reply::Transport("connection refused".to_string()));
        let gateway = gateway(forwarder.clone(), InboundFailurePolicy::ShortCircuit);

        let failure = gateway.relay(&json!({})).await.unwrap_err();

        assert!(matches!(failure.error, RelayError::Upstream(ref m) if m.contains("connection refused")));
        assert_eq!(failure.first.unwrap().status, ForwardStatus::Failed);
        assert!(failure.second.is_none());
        assert!(forwarder.sent_to(SECOND).is_empty());
    }

    #[tokio::test]
    async fn test_continue_policy_attempts_second_destination() {
        let forwarder = Arc::new(FakeForwarder::default());
        forwarder.reply(FIRST, Reply::Status(502, json!("bad gateway")));
        forwarder.reply(SECOND, Reply::Ok(json!({"from": "two"})));
        let gateway = gateway(forwarder.clone(), InboundFailurePolicy::Continue);

        let failure = gateway.relay(&json!({})).await.unwrap_err();

        assert_eq!(forwarder.sent_to(SECOND).len(), 1);
        let second = failure.second.unwrap();
        assert!(second.is_ok());
        assert_eq!(second.body, Some(json!({"from": "two"})));
        assert!(!failure.first.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_second_failure_is_reported() {
        let forwarder = Arc::new(FakeForwarder::default());
        forwarder.reply(SECOND, Reply::Transport("reset".to_string()));
        let gateway = gateway(forwarder, InboundFailurePolicy::ShortCircuit);

        let failure = gateway.relay(&json!({})).await.unwrap_err();

        assert!(failure.first.unwrap().is_ok());
        assert_eq!(failure.second.unwrap().status, ForwardStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_destination_fails_fast() {
        let forwarder = Arc::new(FakeForwarder::default());
        let gateway = InboundGateway::new(
            forwarder.clone(),
            Arc::new(Config {
                inbound_primary_url: Some(FIRST.to_string()),
                ..Config::default()
            }),
        );

        let failure = gateway.relay(&json!({})).await.unwrap_err();

        assert!(matches!(failure.error, RelayError::Config(_)));
        assert!(forwarder.sent().is_empty());
    }
}
