//! Recording fakes for the relay's collaborators.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ForwardError, QueueError, RelayError};
use crate::forward::Forwarder;
use crate::queue::{QueueBackend, QueueDefinition, QueueItem};
use crate::web::auth::IdentityVerifier;

#[derive(Debug, Clone, PartialEq)]
pub enum QueueCall {
    Create(QueueDefinition),
    Enqueue(String, QueueItem),
    Delete(String),
}

/// Queue backend that records calls and keeps definitions in memory.
#[derive(Default)]
pub struct FakeQueueBackend {
    pub calls: Mutex<Vec<QueueCall>>,
    definitions: Mutex<HashMap<String, QueueDefinition>>,
    fail_enqueue: Mutex<bool>,
}

impl FakeQueueBackend {
    pub fn with_queue(name: &str) -> Self {
        let backend = Self::default();
        backend
            .definitions
            .lock()
            .unwrap()
            .insert(name.to_string(), QueueDefinition::new(name, 30, 1));
        backend
    }

    pub fn fail_enqueue(&self) {
        *self.fail_enqueue.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<QueueCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn enqueued(&self) -> Vec<(String, QueueItem)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                QueueCall::Enqueue(name, item) => Some((name, item)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl QueueBackend for FakeQueueBackend {
    async fn create(&self, definition: QueueDefinition) -> Result<(), QueueError> {
        self.calls
            .lock()
            .unwrap()
            .push(QueueCall::Create(definition.clone()));
        let mut definitions = self.definitions.lock().unwrap();
        if definitions.contains_key(&definition.name) {
            return Err(QueueError::AlreadyExists(definition.name));
        }
        definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    async fn enqueue(&self, queue_name: &str, item: QueueItem) -> Result<(), QueueError> {
        self.calls
            .lock()
            .unwrap()
            .push(QueueCall::Enqueue(queue_name.to_string(), item));
        if *self.fail_enqueue.lock().unwrap() {
            return Err(QueueError::Backend("broker unavailable".to_string()));
        }
        if !self.definitions.lock().unwrap().contains_key(queue_name) {
            return Err(QueueError::NotFound(queue_name.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, queue_name: &str) -> Result<(), QueueError> {
        self.calls
            .lock()
            .unwrap()
            .push(QueueCall::Delete(queue_name.to_string()));
        self.definitions
            .lock()
            .unwrap()
            .remove(queue_name)
            .map(|_| ())
            .ok_or_else(|| QueueError::NotFound(queue_name.to_string()))
    }
}

/// Scripted answer for one destination.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Status(u16, Value),
    Transport(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forwarded {
    pub url: String,
    pub body: Value,
    pub headers: Vec<(String, String)>,
}

/// Forwarder that records every call and answers from a script.
#[derive(Default)]
pub struct FakeForwarder {
    replies: Mutex<HashMap<String, Reply>>,
    sent: Mutex<Vec<Forwarded>>,
}

impl FakeForwarder {
    pub fn reply(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn sent(&self) -> Vec<Forwarded> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, url: &str) -> Vec<Forwarded> {
        self.sent().into_iter().filter(|f| f.url == url).collect()
    }
}

#[async_trait]
impl Forwarder for FakeForwarder {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, ForwardError> {
        self.sent.lock().unwrap().push(Forwarded {
            url: url.to_string(),
            body: body.clone(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Reply::Ok(json!({"received": true})));

        match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Status(status, body) => Err(ForwardError::Status { status, body }),
            Reply::Transport(msg) => Err(ForwardError::Transport(msg)),
        }
    }
}

/// Identity verifier accepting exactly one Authorization value.
pub struct FakeIdentityVerifier {
    pub accepted: String,
}

#[async_trait]
impl IdentityVerifier for FakeIdentityVerifier {
    async fn verify(&self, authorization: Option<&str>) -> Result<(), RelayError> {
        match authorization {
            Some(value) if value == self.accepted => Ok(()),
            _ => Err(RelayError::Auth("invalid api key and secret".to_string())),
        }
    }
}
