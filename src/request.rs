use crate::config::{RelayMode, UnknownFieldPolicy, ValidationMode};
use crate::error::{ProxyError, ProxyResult};
use serde_json::{Map, Value};

pub const DEFAULT_MAX_TOKENS: u64 = 8192;

const KNOWN_FIELDS: [&str; 5] = ["model", "messages", "system", "max_tokens", "stream"];

/// Knobs that shape how an inbound body becomes the upstream payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    pub validation: ValidationMode,
    pub unknown_fields: UnknownFieldPolicy,
    pub relay_mode: RelayMode,
}

/// Decodes the raw request body, requiring a JSON object.
pub fn parse_body(bytes: &[u8]) -> ProxyResult<Map<String, Value>> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| ProxyError::InvalidJson(err.to_string()))?;
    match value {
        Value::Object(obj) => Ok(obj),
        _ => Err(ProxyError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        )),
    }
}

/// Validates the payload and rewrites it into what is sent upstream.
pub fn normalize(mut body: Map<String, Value>, opts: &NormalizeOptions) -> ProxyResult<Value> {
    apply_unknown_field_policy(&mut body, opts.unknown_fields)?;

    if opts.validation == ValidationMode::Strict {
        validate_strict(&body)?;
    }

    match body.remove("system") {
        Some(Value::String(system)) => {
            let trimmed = system.trim();
            if !trimmed.is_empty() {
                body.insert("system".to_string(), Value::String(trimmed.to_string()));
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            body.insert("system".to_string(), other);
        }
    }

    if body.get("max_tokens").is_none_or(Value::is_null) {
        body.insert("max_tokens".to_string(), Value::from(DEFAULT_MAX_TOKENS));
    }

    let stream = opts.relay_mode == RelayMode::Stream;
    body.insert("stream".to_string(), Value::Bool(stream));

    Ok(Value::Object(body))
}

fn apply_unknown_field_policy(
    body: &mut Map<String, Value>,
    policy: UnknownFieldPolicy,
) -> ProxyResult<()> {
    match policy {
        UnknownFieldPolicy::Preserve => Ok(()),
        UnknownFieldPolicy::Ignore => {
            body.retain(|k, _| KNOWN_FIELDS.contains(&k.as_str()));
            Ok(())
        }
        UnknownFieldPolicy::Reject => {
            let unknown: Vec<&str> = body
                .keys()
                .map(String::as_str)
                .filter(|k| !KNOWN_FIELDS.contains(k))
                .collect();
            if unknown.is_empty() {
                Ok(())
            } else {
                Err(ProxyError::UnknownField(unknown.join(", ")))
            }
        }
    }
}

fn validate_strict(body: &Map<String, Value>) -> ProxyResult<()> {
    match body.get("model") {
        Some(Value::String(_)) => {}
        _ => return Err(invalid("model must be a string")),
    }
    if !body.get("messages").is_some_and(Value::is_array) {
        return Err(invalid("messages must be an array"));
    }
    match body.get("system") {
        None | Some(Value::Null | Value::String(_) | Value::Array(_)) => {}
        Some(_) => return Err(invalid("system must be a string or an array of content blocks")),
    }
    match body.get("max_tokens") {
        None | Some(Value::Null) => {}
        Some(v) if v.as_u64().is_some_and(|n| n > 0) => {}
        Some(_) => return Err(invalid("max_tokens must be a positive integer")),
    }
    match body.get("stream") {
        None | Some(Value::Null | Value::Bool(_)) => {}
        Some(_) => return Err(invalid("stream must be a boolean")),
    }
    Ok(())
}

fn invalid(message: &str) -> ProxyError {
    ProxyError::InvalidRequest(message.to_string())
}
