use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum SiemError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("provider failure: {0}")]
    Provider(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden")]
    Forbidden,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SiemError>;

impl SiemError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SiemError::Config(msg.into())
    }
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        SiemError::Storage(msg.into())
    }
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        SiemError::Provider(msg.into())
    }
    pub fn source_unavailable<S: Into<String>>(msg: S) -> Self {
        SiemError::SourceUnavailable(msg.into())
    }
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        SiemError::Validation(msg.into())
    }
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        SiemError::NotFound(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        SiemError::Internal(msg.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            SiemError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            SiemError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            SiemError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            SiemError::SourceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SOURCE_UNAVAILABLE"),
            SiemError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            SiemError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SiemError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            SiemError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            SiemError::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            SiemError::Serialization(_) => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            SiemError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl IntoResponse for SiemError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));
        (status, body).into_response()
    }
}
