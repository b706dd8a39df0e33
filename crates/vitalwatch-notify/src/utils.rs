//! Helpers shared by the notification channels.

use serde_json::Value;

/// Maximum length of a response body kept in errors and logs.
pub const MAX_BODY_LENGTH: usize = 1000;

/// Truncate a string to at most `max_len` bytes, on a char boundary.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Redact values of keys that commonly hold secrets (passwords, tokens,
/// API keys), recursing into nested objects and arrays.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                let is_sensitive = key_lower.contains("password")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                    || key_lower.contains("api_key")
                    || key_lower.contains("apikey");

                if is_sensitive {
                    redacted.insert(key.clone(), Value::String("***".to_string()));
                } else if val.is_object() || val.is_array() {
                    redacted.insert(key.clone(), redact_sensitive_json(val));
                } else {
                    redacted.insert(key.clone(), val.clone());
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}

/// Masks all but the last four characters of a destination address for logs.
pub fn mask_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Pulls a message id out of a channel's JSON response body.
///
/// Gateways disagree on the field name; `id`, `message_id`, `messageId`
/// and `sid` are tried in order, string or number.
pub fn extract_message_id(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["id", "message_id", "messageId", "sid"]
        .iter()
        .find_map(|key| match value.get(*key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}
