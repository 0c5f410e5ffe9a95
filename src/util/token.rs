//! Minimal helpers for the JWT-shaped ID tokens issued by the auth backends.
//!
//! Only the claims are inspected; signatures are never verified client side.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Map, Value};

/// Decodes the claims segment of a JWT. Malformed tokens yield an empty object.
pub fn decode_claims(token: &str) -> Value {
    let claims_part = token.split('.').nth(1).unwrap_or_default();
    let normalized = claims_part.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// Returns the `exp` claim (seconds since the epoch), if present.
pub fn expiration_time(token: &str) -> Option<i64> {
    claim_as_i64(&decode_claims(token), "exp")
}

/// Returns the `iat` claim (seconds since the epoch), if present.
pub fn issued_at_time(token: &str) -> Option<i64> {
    claim_as_i64(&decode_claims(token), "iat")
}

/// Builds an unsigned (`alg: none`) token carrying `claims`.
///
/// Used by the in-process auth backend; the managed service signs its own.
pub fn encode_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT"}).to_string());
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{body}.")
}

fn claim_as_i64(claims: &Value, name: &str) -> Option<i64> {
    let value = claims.get(name)?;
    value.as_i64().or_else(|| value.as_u64().map(|v| v as i64))
}
