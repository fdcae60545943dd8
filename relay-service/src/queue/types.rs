//! Queue definitions and the items delivered through them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Route prefix the queue backend calls back into for each delivery.
pub const CALLBACK_PREFIX: &str = "/queues";

/// Names whose callback route would land on a management route.
pub const RESERVED_QUEUE_NAMES: [&str; 2] = ["create", "additem"];

/// AMQP limit on queue name length, in bytes.
const MAX_QUEUE_NAME_LEN: usize = 255;

/// Named, rate- and concurrency-limited delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDefinition {
    /// Unique queue name
    pub name: String,
    /// Route the backend POSTs each delivery to
    pub callback_path: String,
    /// Maximum concurrently outstanding deliveries
    pub max_inflight: u32,
    /// Delivery rate cap
    pub msg_per_second: u32,
    pub active: bool,
}

impl QueueDefinition {
    /// Build an active definition bound to the internal callback route.
    pub fn new(name: &str, max_inflight: u32, msg_per_second: u32) -> Self {
        Self {
            name: name.to_string(),
            callback_path: callback_path(name),
            max_inflight,
            msg_per_second,
            active: true,
        }
    }
}

/// Internal callback route for `name`.
pub fn callback_path(name: &str) -> String {
    format!("{}/{}", CALLBACK_PREFIX, name)
}

/// Why `name` cannot be used as a queue name, if it cannot.
///
/// A name must be a single URL path segment made of unreserved characters,
/// must not shadow a management route and must be acceptable to the broker.
pub fn queue_name_problem(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("queue name is empty".to_string());
    }
    if RESERVED_QUEUE_NAMES.contains(&name) {
        return Some(format!("queue name {:?} is reserved", name));
    }
    if name == "." || name == ".." {
        return Some(format!("queue name {:?} is not a path segment", name));
    }
    if name.starts_with("amq.") {
        return Some(format!("queue name {:?} uses the broker's amq. prefix", name));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Some(format!("queue name is longer than {} bytes", MAX_QUEUE_NAME_LEN));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')))
    {
        return Some(format!("queue name {:?} contains {:?}", name, c));
    }
    None
}

/// Unit of work handed to the queue backend.
///
/// Missing fields deserialize to empty values so that a malformed delivery
/// still reaches the token check and is rejected there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub internal_auth_token: String,
}

impl QueueItem {
    pub fn new(payload: Value, internal_auth_token: String) -> Self {
        Self {
            payload,
            internal_auth_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_binds_callback_route() {
        let def = QueueDefinition::new("q1", 30, 1);
        assert_eq!(def.callback_path, "/queues/q1");
        assert!(def.active);
    }

    #[test]
    fn test_queue_name_rules() {
        for ok in ["q1", "sms-outbound", "tenant_7.priority", "a~b"] {
            assert_eq!(queue_name_problem(ok), None, "{ok}");
        }
        for bad in [
            "", "create", "additem", ".", "..", "amq.gen", "a/b", "a?b", "a#b", "a%2Fb", "a b",
            "é",
        ] {
            assert!(queue_name_problem(bad).is_some(), "{bad}");
        }
        assert!(queue_name_problem(&"q".repeat(256)).is_some());
    }

    #[test]
    fn test_definition_wire_names() {
        let json = serde_json::to_value(QueueDefinition::new("q1", 5, 2)).unwrap();
        assert_eq!(json["maxInflight"], 5);
        assert_eq!(json["msgPerSecond"], 2);
        assert_eq!(json["callbackPath"], "/queues/q1");
    }

    #[test]
    fn test_queue_item_wire_names() {
        let item = QueueItem::new(json!({"to": "1555000"}), "secret".to_string());
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"internalAuthToken\":\"secret\""));
        assert!(json.contains("\"payload\":{\"to\":\"1555000\"}"));
    }

    #[test]
    fn test_queue_item_tolerates_missing_fields() {
        let item: QueueItem = serde_json::from_str(r#"{"unexpected": true}"#).unwrap();
        assert_eq!(item.internal_auth_token, "");
        assert_eq!(item.payload, Value::Null);
    }
}
