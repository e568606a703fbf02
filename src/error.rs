use axum::extract::multipart::MultipartError;
use axum::http::{HeaderValue, header};
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Error as SqlxError;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error as ThisError;
use tracing::{error, warn};

#[derive(Debug, ThisError)]
pub enum NexusError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid file type. Please upload a PDF or DOCX file.")]
    UnsupportedFileType(String),

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Missing or malformed bearer token")]
    Unauthorized,

    #[error("Invalid token: {0}")]
    InvalidCredential(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid username or password")]
    InvalidLogin,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    NotFound(String),

    #[error("Upload rejected: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Gemini API error: {0:?}")]
    GeminiServerError(GeminiError),

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Upstream event stream error: {0}")]
    EventStream(String),

    #[error("No response text from model")]
    EmptyModelResponse,

    #[error("Model response is not valid JSON: {0}")]
    InvalidResponseFormat(serde_json::Error),

    #[error("GEMINI_API_KEY is not set")]
    MissingCredential,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Document extraction failed: {0}")]
    Extraction(String),

    #[error("Prompt file not found: {}", .0.display())]
    PromptMissing(PathBuf),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),
}

impl NexusError {
    /// Translate a failed insert into the uniqueness violation it represents.
    pub fn from_insert(err: SqlxError) -> Self {
        if let SqlxError::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            let message = db_err.message();
            if message.contains("users.email") {
                return NexusError::DuplicateEmail;
            }
            if message.contains("users.username") {
                return NexusError::DuplicateUsername;
            }
        }
        NexusError::DatabaseError(err)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            NexusError::Validation(_)
            | NexusError::UnsupportedFileType(_)
            | NexusError::DuplicateUsername
            | NexusError::DuplicateEmail => StatusCode::BAD_REQUEST,
            NexusError::Unauthorized
            | NexusError::InvalidCredential(_)
            | NexusError::InvalidLogin
            | NexusError::UserNotFound => StatusCode::UNAUTHORIZED,
            NexusError::NotFound(_) => StatusCode::NOT_FOUND,
            NexusError::Multipart(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            NexusError::Validation(_) => "VALIDATION_ERROR",
            NexusError::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            NexusError::DuplicateUsername => "DUPLICATE_USERNAME",
            NexusError::DuplicateEmail => "DUPLICATE_EMAIL",
            NexusError::Unauthorized
            | NexusError::InvalidCredential(_)
            | NexusError::InvalidLogin
            | NexusError::UserNotFound => "UNAUTHORIZED",
            NexusError::NotFound(_) => "NOT_FOUND",
            NexusError::Multipart(_) => "INVALID_UPLOAD",
            NexusError::GeminiServerError(_)
            | NexusError::UpstreamStatus(_)
            | NexusError::EventStream(_)
            | NexusError::EmptyModelResponse
            | NexusError::InvalidResponseFormat(_)
            | NexusError::Reqwest(_) => "UPSTREAM_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => match self.code() {
                "UPSTREAM_ERROR" => "The AI service failed to produce a usable response.".to_string(),
                _ => "An internal server error occurred.".to_string(),
            },
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for NexusError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ApiErrorBody {
            code: self.code().to_string(),
            message: self.public_message(),
        };
        let mut response = (status, Json(ApiErrorResponse { error: body })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Standardized API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// Gemini API error response structure
#[derive(Deserialize, Debug)]
pub struct GeminiError {
    pub error: GeminiErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct GeminiErrorBody {
    pub code: u32,
    pub message: String,
    pub status: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(resp: axum::response::Response) -> ApiErrorResponse {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_kinds_carry_bearer_challenge() {
        for err in [
            NexusError::Unauthorized,
            NexusError::InvalidLogin,
            NexusError::UserNotFound,
        ] {
            let resp = err.into_response();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
        }
    }

    #[tokio::test]
    async fn duplicates_and_validation_are_bad_requests() {
        let resp = NexusError::DuplicateUsername.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_of(resp).await;
        assert_eq!(body.error.code, "DUPLICATE_USERNAME");
        assert_eq!(body.error.message, "Username already exists");

        let resp = NexusError::Validation("text must not be empty".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_failures_hide_details() {
        let resp = NexusError::EmptyModelResponse.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(resp).await;
        assert_eq!(body.error.code, "UPSTREAM_ERROR");
        assert!(!body.error.message.contains("No response text"));

        let resp = NexusError::MissingCredential.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(resp).await.error.code, "INTERNAL_ERROR");
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = NexusError::NotFound("Conversation not found for this category.".into());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
