//! Turns failures into the short text shown to the user.

use crate::api::ApiError;
use crate::flow::{IllegalTransition, InvalidPickupCode};

pub const SERVER_ERROR: &str = "Server error. Please try again later";
pub const CONNECTION_PROBLEM: &str = "Connection problem";

/// Alert text for a failed backend interaction.
///
/// Server errors get a generic message; client errors show what the server
/// said, or `fallback` when it said nothing useful. Local validation errors
/// are shown as is.
pub fn user_message(err: &anyhow::Error, fallback: &str) -> String {
    if let Some(api) = err.downcast_ref::<ApiError>() {
        return api_message(api, fallback);
    }
    if err.is::<IllegalTransition>() || err.is::<InvalidPickupCode>() {
        return err.to_string();
    }
    CONNECTION_PROBLEM.to_string()
}

pub fn api_message(err: &ApiError, fallback: &str) -> String {
    match err {
        _ if err.is_server_error() => SERVER_ERROR.to_string(),
        ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
        ApiError::Status { .. } => fallback.to_string(),
        ApiError::Json(_) | ApiError::InvalidUrl(_) => fallback.to_string(),
        ApiError::Transport(_) => CONNECTION_PROBLEM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_server_errors_are_generic() {
        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, br#"{"message":"db down"}"#);
        assert_eq!(user_message(&err.into(), "fallback"), SERVER_ERROR);
    }

    #[test]
    fn test_client_errors_show_server_message() {
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, br#"{"error":"Route too long"}"#);
        assert_eq!(user_message(&err.into(), "fallback"), "Route too long");
    }

    #[test]
    fn test_other_errors_are_connection_problems() {
        let err = anyhow::anyhow!("socket closed");
        assert_eq!(user_message(&err, "fallback"), CONNECTION_PROBLEM);
    }

    #[test]
    fn test_validation_errors_are_shown_verbatim() {
        let err: anyhow::Error = "12".parse::<crate::flow::PickupCode>().unwrap_err().into();
        assert_eq!(user_message(&err, "fallback"), "pickup code must be exactly 4 digits");
    }

    #[test]
    fn test_context_does_not_hide_api_errors() {
        use anyhow::Context;
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, b"");
        let err = Err::<(), _>(err).context("failed to ensure driver profile").unwrap_err();
        assert_eq!(user_message(&err, "fallback"), SERVER_ERROR);
    }

    #[test]
    fn test_decode_errors_use_fallback() {
        let json_err = serde_json::from_str::<u8>("x").unwrap_err();
        let err = ApiError::from(json_err);
        assert_eq!(api_message(&err, "Could not accept the order"), "Could not accept the order");
    }
}
