use serde_json::Value;
use thiserror::Error;

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cassette error: {0}")]
    Cassette(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Bad request (400): {0}")]
    BadRequest(String),

    #[error("Unauthorized (401): {0}")]
    Unauthorized(String),

    #[error("Forbidden (403): {0}")]
    Forbidden(String),

    #[error("Not found (404): {0}")]
    NotFound(String),

    #[error("Conflict (409): {0}")]
    Conflict(String),

    #[error("Rate limit exceeded (429): {0}")]
    RateLimited(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("HTTP error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Build the error for a non-2xx response.
    pub fn from_status(status: u16, body: Option<&Value>) -> Self {
        let message = error_message(body);
        match status {
            400 => ApiError::BadRequest(message),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited(message),
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Status { status, message },
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::BadRequest(_) => Some(400),
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::RateLimited(_) => Some(429),
            ApiError::Server { status, .. } | ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for errors raised before any request left the process.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            ApiError::Validation(_) | ApiError::Config(_) | ApiError::Cassette(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RateLimited(_) => true,
            ApiError::Server { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            ApiError::Transport(_) => true,
            _ => false,
        }
    }
}

fn error_message(body: Option<&Value>) -> String {
    match body {
        None | Some(Value::Null) => "<empty body>".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(value) => value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| value.to_string()),
    }
}
