use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// Structured API error: every non-2xx body is
/// `{error, message, status, details?}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status_code: StatusCode,
    pub error: &'static str,
    pub message: String,
    pub status: u16,
    pub details: Option<Value>,
}

impl ApiError {
    fn new(status_code: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status_code,
            error,
            message: message.into(),
            status: status_code.as_u16(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid API key",
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn cannot_delete_default() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "cannot_delete_default",
            "The default project cannot be deleted",
        )
    }

    pub fn unknown_project(project_id: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unknown_project",
            format!("Unknown project: {}", project_id),
        )
    }

    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Rate limit exceeded",
        );
        err.details = Some(serde_json::json!({
            "retry_after_seconds": retry_after_seconds
        }));
        err
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code;
        (status, Json(self)).into_response()
    }
}

impl From<hiveboard_store::Error> for ApiError {
    fn from(err: hiveboard_store::Error) -> Self {
        match err {
            hiveboard_store::Error::Conflict(msg) => ApiError::conflict(msg),
            hiveboard_store::Error::CannotDeleteDefault => ApiError::cannot_delete_default(),
            hiveboard_store::Error::NotFound(msg) => ApiError::not_found(msg),
            // Persistence failures are transient; clients retry with the
            // same event_ids and dedup makes that safe.
            hiveboard_store::Error::Io(err) => ApiError::internal(err.to_string()),
            hiveboard_store::Error::Serde(err) => ApiError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let err = ApiError::not_found("no such task");
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["status"], 404);
        assert_eq!(body["message"], "no such task");
        assert!(body["details"].is_null());
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let err = ApiError::rate_limited(2);
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["error"], "rate_limited");
        assert_eq!(body["details"]["retry_after_seconds"], 2);
    }
}
