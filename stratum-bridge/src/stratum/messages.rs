//! Stratum message types and the pool handshake.
//!
//! The bridge only ever builds two messages of its own: the `mining.subscribe`
//! and `mining.authorize` pair sent when the upstream connection comes up.
//! Everything a browser client sends is handled as an opaque JSON object
//! (see [`ClientMessage`]) so fields the bridge does not know about survive
//! the trip upstream untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{BridgeError, BridgeResult};

/// Handshake request announcing the client to the pool.
pub const SUBSCRIBE: &str = "mining.subscribe";

/// Handshake request presenting the worker credential.
pub const AUTHORIZE: &str = "mining.authorize";

/// Share submission.
pub const SUBMIT: &str = "mining.submit";

/// JSON-RPC message id.
///
/// Stratum pools echo whatever id they receive. Browser clients use numbers,
/// so the bridge's own handshake uses text ids to keep the pool's replies
/// distinguishable when they are broadcast to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(u64),
    Text(String),
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId::Text(id.to_string())
    }
}

/// Outgoing JSON-RPC request.
///
/// Stratum v1 predates JSON-RPC 2.0: there is no `jsonrpc` version field and
/// notifications carry `id: null` rather than omitting the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Message ID (null for notifications)
    pub id: Option<MessageId>,
    /// Method name
    pub method: String,
    /// Positional parameters
    pub params: Value,
}

impl Request {
    /// Create a new request message.
    pub fn new(id: impl Into<MessageId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// `mining.subscribe` carrying the client version tag.
    pub fn subscribe(user_agent: &str) -> Self {
        Self::new("subscribe", SUBSCRIBE, json!([user_agent]))
    }

    /// `mining.authorize` carrying the worker identity and its secondary tag.
    pub fn authorize(worker: &str, password: &str) -> Self {
        Self::new("authorize", AUTHORIZE, json!([worker, password]))
    }
}

/// A message received from a browser client.
///
/// Kept as a raw JSON object: only `method` and `params` are ever inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage(Map<String, Value>);

impl ClientMessage {
    /// Parse one framed line.
    ///
    /// Anything that is not a JSON object is rejected; arrays and scalars
    /// have no method to route on.
    pub fn parse(line: &str) -> BridgeResult<Self> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(BridgeError::InvalidMessage(format!(
                "expected a JSON object, got {}",
                kind(&other)
            ))),
        }
    }

    /// Method name, if present and a string.
    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    /// Whether this message calls `method`.
    pub fn is(&self, method: &str) -> bool {
        self.method() == Some(method)
    }

    /// Take the `params` value out for rewriting, leaving `null` behind.
    pub fn take_params(&mut self) -> Option<Value> {
        self.0.get_mut("params").map(Value::take)
    }

    /// Put (possibly rewritten) params back.
    pub fn set_params(&mut self, params: Value) {
        self.0.insert("params".to_string(), params);
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
