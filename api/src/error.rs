//! Error types for the API.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types following RFC 7807 Problem Details.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400) - malformed path segment or file type
    BadRequest(String),

    /// Not found (404) - manifest, chunk or source doesn't exist
    NotFound(String),

    /// Range not satisfiable (416) - carries the full length for `Content-Range`
    RangeNotSatisfiable {
        /// The problem with the requested range
        detail: String,
        /// Length of the complete representation in bytes
        total: u64,
    },

    /// Internal server error (500)
    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            Self::NotFound(msg) => write!(f, "Not Found: {}", msg),
            Self::RangeNotSatisfiable { detail, total } => {
                write!(f, "Range Not Satisfiable [total: {}]: {}", total, detail)
            }
            Self::InternalError(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// RFC 7807 Problem Details response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type
    #[serde(rename = "type")]
    pub type_uri: String,

    /// Short, human-readable summary
    pub title: String,

    /// HTTP status code
    pub status: u16,

    /// Human-readable explanation
    pub detail: String,

    /// URI reference identifying the specific occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title, detail) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", msg.clone()),
            Self::RangeNotSatisfiable { detail, .. } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                "Range Not Satisfiable",
                detail.clone(),
            ),
            Self::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                msg.clone(),
            ),
        };

        let problem = ProblemDetails {
            type_uri: format!(
                "https://thermal-data.dev/errors/{}",
                title.to_lowercase().replace(' ', "-")
            ),
            title: title.to_string(),
            status: status.as_u16(),
            detail,
            instance: None,
        };

        let mut response = (status, Json(problem)).into_response();
        if let Self::RangeNotSatisfiable { total, .. } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

impl From<thermal_chunking::ChunkingError> for ApiError {
    fn from(err: thermal_chunking::ChunkingError) -> Self {
        ApiError::InternalError(format!("Failed to read chunk artifacts: {}", err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::InternalError(format!("I/O error: {}", err))
    }
}
