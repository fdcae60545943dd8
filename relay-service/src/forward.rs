//! Outbound JSON forwarding to downstream destinations.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ForwardError;

/// Something that can POST a JSON body and return the response body.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// POST `body` to `url`; any non-2xx answer is a [`ForwardError::Status`].
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, ForwardError>;
}

/// [`Forwarder`] over a shared reqwest client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpForwarder {
    pub fn new(client: Client, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }
}

/// Parse a response body as JSON, falling back to a JSON string.
fn body_to_value(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, ForwardError> {
        let mut request = self.client.post(url).json(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    error!(url = url, error = %e, "forward_timeout");
                } else {
                    error!(url = url, error = %e, "forward_request_error");
                }
                return Err(ForwardError::Transport(e.to_string()));
            }
        };

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;
        let value = body_to_value(&bytes);

        info!(
            url = url,
            status_code = status.as_u16(),
            is_success = status.is_success(),
            "forward_complete"
        );

        if status.is_success() {
            Ok(value)
        } else {
            Err(ForwardError::Status {
                status: status.as_u16(),
                body: value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_body_to_value() {
        assert_eq!(body_to_value(b""), Value::Null);
        assert_eq!(body_to_value(br#"{"ok":true}"#), json!({"ok": true}));
        assert_eq!(body_to_value(b"plain text"), json!("plain text"));
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent"))
            .and(header("X-Vgai-Key", "secret"))
            .and(body_json(json!({"to": "1555000"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
            .expect(1)
            .mount(&server)
            .await;

        let forwarder = HttpForwarder::new(Client::new(), None);
        let resp = forwarder
            .post_json(
                &format!("{}/agent", server.uri()),
                &json!({"to": "1555000"}),
                &[("X-Vgai-Key", "secret")],
            )
            .await
            .unwrap();

        assert_eq!(resp, json!({"accepted": true}));
    }

    #[tokio::test]
    async fn test_post_json_non_2xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let forwarder = HttpForwarder::new(Client::new(), None);
        let err = forwarder
            .post_json(&server.uri(), &json!({}), &[])
            .await
            .unwrap_err();

        match err {
            ForwardError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, json!("down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_json_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let forwarder = HttpForwarder::new(Client::new(), Some(Duration::from_millis(50)));
        let err = forwarder
            .post_json(&server.uri(), &json!({}), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Transport(_)));
    }
}
