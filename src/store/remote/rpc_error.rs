use reqwest::StatusCode;
use serde::Deserialize;

use crate::store::error::{
    aborted, deadline_exceeded, internal_error, invalid_argument, not_found, permission_denied,
    resource_exhausted, unauthenticated, unavailable, StoreError,
};

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Maps a failed REST response onto a store error code.
///
/// The canonical `status` string of the Google error payload wins over the
/// HTTP status when both are present.
pub fn map_http_error(status: StatusCode, body: &str) -> StoreError {
    let payload = extract_error_payload(body);
    let message = payload
        .as_ref()
        .and_then(|payload| payload.message.clone())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("HTTP error").to_string());

    if let Some(code) = payload.as_ref().and_then(|payload| payload.status.as_deref()) {
        if let Some(error) = map_status_code(code, &message) {
            return error;
        }
    }

    match status {
        StatusCode::BAD_REQUEST => invalid_argument(message),
        StatusCode::UNAUTHORIZED => unauthenticated(message),
        StatusCode::FORBIDDEN => permission_denied(message),
        StatusCode::NOT_FOUND => not_found(message),
        StatusCode::CONFLICT => aborted(message),
        StatusCode::TOO_MANY_REQUESTS => resource_exhausted(message),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => unavailable(message),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => deadline_exceeded(message),
        StatusCode::OK => internal_error("Received HTTP 200 while handling error"),
        status if status.is_client_error() => invalid_argument(message),
        _ => internal_error(message),
    }
}

fn map_status_code(status: &str, message: &str) -> Option<StoreError> {
    let message = message.to_string();
    let error = match status {
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" | "ALREADY_EXISTS" => {
            invalid_argument(message)
        }
        "UNAUTHENTICATED" => unauthenticated(message),
        "PERMISSION_DENIED" => permission_denied(message),
        "NOT_FOUND" => not_found(message),
        "ABORTED" => aborted(message),
        "RESOURCE_EXHAUSTED" => resource_exhausted(message),
        "UNAVAILABLE" => unavailable(message),
        "DEADLINE_EXCEEDED" => deadline_exceeded(message),
        "CANCELLED" | "DATA_LOSS" | "UNKNOWN" | "INTERNAL" => internal_error(message),
        _ => return None,
    };
    Some(error)
}

fn extract_error_payload(body: &str) -> Option<GoogleError> {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::error::StoreErrorCode;

    #[test]
    fn payload_status_takes_precedence() {
        let body = r#"{"error":{"code":409,"message":"Transaction lock timeout","status":"ABORTED"}}"#;
        let error = map_http_error(StatusCode::CONFLICT, body);
        assert_eq!(error.code, StoreErrorCode::Aborted);
        assert_eq!(error.message(), "Transaction lock timeout");
    }

    #[test]
    fn falls_back_to_http_status() {
        let error = map_http_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(error.code, StoreErrorCode::Unavailable);
        assert_eq!(error.message(), "Service Unavailable");
    }
}
