//! Cache key generation.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{ProxyError, Result};
use crate::fingerprint::short_hex;
use crate::protocol::ChatRequest;

/// Fingerprint of the request fields that determine a completion.
///
/// Built from `model`, `messages`, `temperature` and `max_tokens`, serialized
/// as a JSON object with sorted keys (`serde_json::Map` is ordered), hashed
/// with SHA-256 and truncated to [`CacheKey::LEN`] hex characters.
///
/// An absent temperature is encoded as `null`, never as the API default, so
/// a request without one never shares a slot with an explicit
/// `"temperature": 1.0` request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key width in hex characters
    pub const LEN: usize = 16;

    /// Compute the key for a request
    pub fn for_request(request: &ChatRequest) -> Result<Self> {
        let messages =
            serde_json::to_value(request.messages()).map_err(ProxyError::CacheSerialization)?;

        let mut parts = Map::new();
        parts.insert(
            "model".to_string(),
            Value::from(request.model.as_deref().unwrap_or_default()),
        );
        parts.insert("messages".to_string(), messages);
        parts.insert(
            "temperature".to_string(),
            request.temperature.map_or(Value::Null, Value::from),
        );
        parts.insert(
            "max_tokens".to_string(),
            request
                .max_tokens
                .clone()
                .map_or(Value::Null, Value::Number),
        );

        let canonical =
            serde_json::to_vec(&Value::Object(parts)).map_err(ProxyError::CacheSerialization)?;
        Ok(Self(short_hex(&canonical, Self::LEN)))
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> ChatRequest {
        serde_json::from_value(body).unwrap()
    }

    fn key(body: Value) -> CacheKey {
        CacheKey::for_request(&request(body)).unwrap()
    }

    #[test]
    fn test_key_shape() {
        let key = key(json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}));
        assert_eq!(key.as_str().len(), CacheKey::LEN);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(key.to_string(), key.as_str());
    }

    #[test]
    fn test_key_ignores_field_order_and_extras() {
        let a = key(json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi", "name": "bob"}],
            "temperature": 0,
            "stream": false,
            "user": "u-1"
        }));
        let b = key(json!({
            "temperature": 0.0,
            "messages": [{"name": "bob", "content": "hi", "role": "user"}],
            "model": "gpt-4",
            "seed": 42
        }));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_each_field() {
        let base = json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0,
            "max_tokens": 10
        });
        let base_key = key(base.clone());

        for (field, value) in [
            ("model", json!("gpt-4o")),
            ("messages", json!([{"role": "user", "content": "hello"}])),
            ("temperature", json!(0.5)),
            ("max_tokens", json!(11)),
        ] {
            let mut changed = base.clone();
            changed[field] = value;
            assert_ne!(key(changed), base_key, "changing {field} must change the key");
        }
    }

    #[test]
    fn test_absent_temperature_distinct_from_default() {
        let absent = key(json!({"model": "m", "messages": []}));
        let explicit = key(json!({"model": "m", "messages": [], "temperature": 1.0}));
        let zero = key(json!({"model": "m", "messages": [], "temperature": 0}));
        assert_ne!(absent, explicit);
        assert_ne!(absent, zero);
    }

    #[test]
    fn test_missing_messages_same_as_empty() {
        assert_eq!(
            key(json!({"model": "m"})),
            key(json!({"model": "m", "messages": []}))
        );
    }
}
