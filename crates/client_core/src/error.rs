use shared::{
    domain::{QuestionId, UnknownSerie},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

use crate::{credentials::CredentialError, workflow::WorkflowStep};

fn megabytes(bytes: &u64) -> u64 {
    bytes / (1024 * 1024)
}

/// Input problems caught before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please fill in every field (missing {0})")]
    MissingField(&'static str),
    #[error("'{0}' is not a recognised baccalaureate series (expected one of S, C, D, A1, A2, L, OSE)")]
    UnknownSerie(String),
    #[error("The transcript must be an image (JPG, PNG, ...), got '{mime_type}'")]
    NotAnImage { mime_type: String },
    #[error("The transcript file is empty")]
    EmptyTranscript,
    #[error("The transcript image must not exceed {} MB ({size} bytes given)", megabytes(.limit))]
    TranscriptTooLarge { size: u64, limit: u64 },
    #[error("Question {0} does not belong to this session")]
    UnknownQuestion(QuestionId),
    #[error("Please answer every question")]
    UnansweredQuestions(Vec<QuestionId>),
    #[error("Passwords do not match")]
    PasswordMismatch,
}

impl From<UnknownSerie> for ValidationError {
    fn from(value: UnknownSerie) -> Self {
        ValidationError::UnknownSerie(value.0)
    }
}

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("invalid API base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("Connection to the server failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Backend(#[from] ApiError),
    #[error("unexpected response from server: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no refresh token stored; sign in again")]
    MissingRefreshToken,
}

impl ApiClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiClientError::Backend(err) if err.code == ErrorCode::Unauthorized)
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error("cannot {action} while {step}")]
    InvalidStep {
        action: &'static str,
        step: WorkflowStep,
    },
}

impl WorkflowError {
    /// Text suitable for the inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Api(ApiClientError::Validation(err)) | WorkflowError::Validation(err) => {
                err.to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkflowError::Validation(_) | WorkflowError::Api(ApiClientError::Validation(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_surface_the_server_message() {
        let err = WorkflowError::from(ApiClientError::from(ApiError::new(400, "invalid file")));
        assert_eq!(err.user_message(), "invalid file");
    }

    #[test]
    fn size_limit_is_reported_in_megabytes() {
        let err = ValidationError::TranscriptTooLarge {
            size: 6 * 1024 * 1024,
            limit: 5 * 1024 * 1024,
        };
        assert!(err.to_string().contains("5 MB"));
    }

    #[test]
    fn detects_unauthorized_backend_errors() {
        let err = ApiClientError::from(ApiError::new(401, "Token invalide"));
        assert!(err.is_unauthorized());
        assert!(!ApiClientError::MissingRefreshToken.is_unauthorized());
    }
}
