use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure of a backend call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("API error {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A request body could not be encoded or a response body decoded.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Builds a [`ApiError::Status`] from a raw error response, extracting a
    /// best-effort human message from the usual body shapes.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let body: Option<Value> = serde_json::from_slice(body).ok().or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(Value::String(text))
        });
        let message = body
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown Error").to_string());

        ApiError::Status {
            status,
            message,
            body,
        }
    }

    /// HTTP status, when the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_server_error())
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }

    /// Message suitable for showing to the user.
    pub fn message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Per-field validation messages from an `errors` object, if present.
    pub fn validation_errors(&self) -> Option<BTreeMap<String, Vec<String>>> {
        let ApiError::Status {
            body: Some(body), ..
        } = self
        else {
            return None;
        };
        let errors = body.get("errors")?.as_object()?;
        Some(
            errors
                .iter()
                .map(|(field, msgs)| (field.clone(), string_list(msgs)))
                .collect(),
        )
    }
}

fn extract_message(body: &Value) -> Option<String> {
    if let Some(text) = body.as_str() {
        return non_empty(text);
    }
    for key in ["message", "error"] {
        if let Some(text) = body.get(key).and_then(Value::as_str).and_then(non_empty) {
            return Some(text);
        }
    }
    let errors = body.get("errors")?.as_object()?;
    let joined = errors
        .iter()
        .flat_map(|(field, msgs)| {
            string_list(msgs)
                .into_iter()
                .map(move |m| format!("{field}: {m}"))
        })
        .collect::<Vec<_>>()
        .join("; ");
    non_empty(&joined)
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_for(status: u16, body: &str) -> String {
        ApiError::from_response(StatusCode::from_u16(status).unwrap(), body.as_bytes()).message()
    }

    #[test]
    fn test_message_field_wins() {
        assert_eq!(
            message_for(400, r#"{"message":"Bad origin","error":"ignored"}"#),
            "Bad origin"
        );
    }

    #[test]
    fn test_error_field_used_when_message_empty() {
        assert_eq!(message_for(400, r#"{"message":"","error":"No driver"}"#), "No driver");
    }

    #[test]
    fn test_errors_map_flattened() {
        let msg = message_for(422, r#"{"errors":{"origin":["is required"]}}"#);
        assert_eq!(msg, "origin: is required");
    }

    #[test]
    fn test_plain_text_body() {
        assert_eq!(message_for(409, "wrong ride code"), "wrong ride code");
    }

    #[test]
    fn test_falls_back_to_reason_phrase() {
        assert_eq!(message_for(404, ""), "Not Found");
        assert_eq!(message_for(500, r#"{"code":17}"#), "Internal Server Error");
    }

    #[test]
    fn test_status_helpers() {
        let err = ApiError::from_response(StatusCode::CONFLICT, b"");
        assert!(err.is_conflict());
        assert!(!err.is_server_error());

        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, b"");
        assert!(err.is_server_error());
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn test_validation_errors() {
        let err = ApiError::from_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            br#"{"errors":{"origin":["is required","is invalid"],"destination":"missing"}}"#,
        );
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors["origin"], vec!["is required", "is invalid"]);
        assert_eq!(errors["destination"], vec!["missing"]);

        let err = ApiError::from_response(StatusCode::BAD_REQUEST, br#"{"message":"x"}"#);
        assert!(err.validation_errors().is_none());
    }
}
