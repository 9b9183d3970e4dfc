//! Chat-completion request types.
//!
//! Only the fields the proxy reads or rewrites are typed. Everything else
//! on a request, message or content part is kept in a flattened `extra` map
//! so it survives a parse/serialize round trip untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};
use serde_json::{Map, Number, Value};

use crate::error::{ProxyError, Result};

/// Chat-completion request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Conversation messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Completion length limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Number>,

    /// Whether the client asked for an incremental (SSE) response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Every other field, forwarded verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Parse a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(ProxyError::Parse)
    }

    /// Streaming flag (absent means buffered)
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// A request is deterministic unless it carries an explicit positive
    /// temperature.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self.temperature, Some(t) if t > 0.0)
    }

    /// Messages, or an empty slice when the field is absent
    pub fn messages(&self) -> &[Message] {
        self.messages.as_deref().unwrap_or_default()
    }
}

/// Swap the `messages` array of a raw request body.
///
/// Every other top-level field keeps its original JSON text, so integers
/// wider than 64 bits and explicit `null`s reach the upstream as sent.
pub fn replace_messages(body: &[u8], messages: &[Message]) -> Result<Vec<u8>> {
    let mut fields: BTreeMap<String, Box<RawValue>> =
        serde_json::from_slice(body).map_err(ProxyError::Parse)?;
    fields.insert("messages".to_string(), to_raw_value(messages)?);
    Ok(serde_json::to_vec(&fields)?)
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role (system, user, assistant, tool, ...)
    pub role: String,

    /// Message body
    #[serde(default, skip_serializing_if = "Content::is_absent")]
    pub content: Content,

    /// Unrecognized message fields (name, tool_calls, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a plain-text message
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Content::Text(text.into()),
            extra: Map::new(),
        }
    }
}

/// Message content.
///
/// Anything that is neither a string nor a list of parts lands in
/// [`Content::Other`] and is passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Multi-part content (text, images, audio, ...)
    Parts(Vec<Part>),
    /// Unrecognized shape (null, number, object)
    Other(Value),
    /// Field not present on the message
    #[serde(skip)]
    Absent,
}

impl Default for Content {
    fn default() -> Self {
        Content::Absent
    }
}

impl Content {
    /// Whether the field was missing from the message
    pub fn is_absent(&self) -> bool {
        matches!(self, Content::Absent)
    }
}

/// One element of multi-part content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// `{"type": "text", "text": ...}`
    Text(TextPart),
    /// Any other part, kept opaque
    Other(Value),
}

/// A text part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    #[serde(rename = "type")]
    kind: TextKind,

    /// Part text
    pub text: String,

    /// Unrecognized part fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TextPart {
    /// Create a text part
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Text,
            text: text.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TextKind {
    #[serde(rename = "text")]
    Text,
}
