use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shown when the backend rejects a request without saying why.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
    Unknown,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCode::Validation,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            429 => ErrorCode::RateLimited,
            500..=599 => ErrorCode::Internal,
            _ => ErrorCode::Unknown,
        }
    }
}

/// A non-success response from the backend, normalized from whichever of
/// `error`, `message` or `detail` the endpoint used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::from_status(status),
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_response(status: u16, body: Option<&Value>) -> Self {
        let mut error = Self::new(status, GENERIC_ERROR_MESSAGE);
        let Some(Value::Object(fields)) = body else {
            return error;
        };

        let message = ["error", "message", "detail"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .filter(|message| !message.trim().is_empty());

        match message {
            Some(message) => {
                error.message = message.to_string();
                error.details = fields.get("details").filter(|v| !v.is_null()).cloned();
            }
            // Field-level validation errors come back as a bare map.
            None if !fields.is_empty() => {
                error.details = Some(Value::Object(fields.clone()));
            }
            None => {}
        }

        error
    }

    /// Message followed by the details payload, as shown to the user.
    pub fn display_message(&self) -> String {
        match &self.details {
            None => self.message.clone(),
            Some(Value::String(details)) => format!("{} {details}", self.message),
            Some(details) => format!("{} {details}", self.message),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_message())
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prefers_error_over_message() {
        let body = json!({ "error": "Données invalides", "message": "ignored" });
        let err = ApiError::from_response(400, Some(&body));
        assert_eq!(err.message, "Données invalides");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[test]
    fn uses_message_without_trailing_details() {
        let body = json!({ "message": "invalid file" });
        let err = ApiError::from_response(400, Some(&body));
        assert_eq!(err.display_message(), "invalid file");
    }

    #[test]
    fn appends_serialized_details() {
        let body = json!({
            "error": "Données invalides",
            "details": { "releve_note": ["Le fichier doit être une image"] }
        });
        let err = ApiError::from_response(400, Some(&body));
        assert_eq!(
            err.display_message(),
            r#"Données invalides {"releve_note":["Le fichier doit être une image"]}"#
        );
    }

    #[test]
    fn string_details_are_not_quoted() {
        let body = json!({ "error": "Erreur", "details": "timeout" });
        let err = ApiError::from_response(500, Some(&body));
        assert_eq!(err.display_message(), "Erreur timeout");
        assert_eq!(err.code, ErrorCode::Internal);
    }

    #[test]
    fn falls_back_to_generic_message() {
        let err = ApiError::from_response(502, None);
        assert_eq!(err.display_message(), GENERIC_ERROR_MESSAGE);

        let err = ApiError::from_response(500, Some(&json!(["unexpected"])));
        assert_eq!(err.message, GENERIC_ERROR_MESSAGE);
        assert!(err.details.is_none());
    }

    #[test]
    fn keeps_field_errors_as_details() {
        let body = json!({ "username": ["A user with that username already exists."] });
        let err = ApiError::from_response(400, Some(&body));
        assert_eq!(err.message, GENERIC_ERROR_MESSAGE);
        assert_eq!(err.details, Some(body));
    }

    #[test]
    fn reads_framework_detail_key() {
        let body = json!({ "detail": "Authentication credentials were not provided." });
        let err = ApiError::from_response(401, Some(&body));
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(
            err.message,
            "Authentication credentials were not provided."
        );
    }
}
