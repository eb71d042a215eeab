//! JSON error responses for the HTTP variant

use crate::error::{as_aeon_error, AeonError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A failed request, rendered as `{"message": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Error with an explicit status
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 with `message`
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 404 with `message`
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response message
    pub fn message(&self) -> &str {
        &self.message
    }
}

fn status_for(error: &anyhow::Error) -> StatusCode {
    match as_aeon_error(error) {
        Some(AeonError::NotFound(_)) => StatusCode::NOT_FOUND,
        Some(AeonError::Conflict(_))
        | Some(AeonError::Collision(_))
        | Some(AeonError::ActiveSession(_)) => StatusCode::CONFLICT,
        Some(AeonError::Usage { .. })
        | Some(AeonError::InvalidName(_))
        | Some(AeonError::Config(_))
        | Some(AeonError::Backup(_))
        | Some(AeonError::Ingestion(_))
        | Some(AeonError::Yaml(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        let error = error.into();
        let status = status_for(&error);
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", error);
        } else {
            tracing::debug!(status = %status, "Request rejected: {}", error);
        }
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "message": self.message });
        (self.status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_error_kind() {
        let not_found: ApiError = AeonError::NotFound("chat_1".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = AeonError::Conflict("chat_2".to_string()).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let usage: ApiError = AeonError::Usage {
            command: "/echo".to_string(),
            parameters: "<prompt>".to_string(),
        }
        .into();
        assert_eq!(usage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(usage.message(), "Usage: /echo <prompt>");

        let other: ApiError = AeonError::Rag("model offline".to_string()).into();
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_context_keeps_kind() {
        use anyhow::Context;
        let result: anyhow::Result<()> =
            Err(AeonError::NotFound("x".to_string())).context("Failed to open");
        let error: ApiError = result.unwrap_err().into();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert_eq!(error.message(), "Failed to open");
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::bad_request("No message provided.").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
