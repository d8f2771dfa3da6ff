//! Error types for the mp3 server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use file_artifact_store::StoreError;
use std::fmt;

/// Startup and configuration failures. Any of these is fatal.
#[derive(Debug)]
pub enum Mp3ServerError {
    Config(String),
    Io(Box<std::io::Error>),
    Store(StoreError),
}

impl fmt::Display for Mp3ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mp3ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            Mp3ServerError::Io(err) => write!(f, "IO error: {}", err),
            Mp3ServerError::Store(err) => write!(f, "Store error: {}", err),
        }
    }
}

impl std::error::Error for Mp3ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Mp3ServerError::Io(err) => Some(err.as_ref()),
            Mp3ServerError::Store(err) => Some(err),
            Mp3ServerError::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for Mp3ServerError {
    fn from(err: std::io::Error) -> Self {
        Mp3ServerError::Io(Box::new(err))
    }
}

impl From<StoreError> for Mp3ServerError {
    fn from(err: StoreError) -> Self {
        Mp3ServerError::Store(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for Mp3ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        Mp3ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Mp3ServerError>;

/// Failure to produce an artifact.
///
/// Cloned to every request waiting on the same download, so it carries
/// strings rather than source errors.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The downloader could not be started
    Spawn(String),
    /// The downloader exited unsuccessfully; `output` is its captured output
    Download { status: Option<i32>, output: String },
    /// The downloaded file could not be moved into the store
    Store(String),
    /// The download task died before reporting an outcome
    Task(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Spawn(msg) => write!(f, "Failed to start downloader: {}", msg),
            FetchError::Download {
                status: Some(code),
                output,
            } => write!(f, "Downloader exited with status {}: {}", code, output),
            FetchError::Download {
                status: None,
                output,
            } => write!(f, "Downloader killed by signal: {}", output),
            FetchError::Store(msg) => write!(f, "Failed to store download: {}", msg),
            FetchError::Task(msg) => write!(f, "Download task failed: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<StoreError> for FetchError {
    fn from(err: StoreError) -> Self {
        FetchError::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::Task(err.to_string())
    }
}

/// Errors returned to HTTP clients as a short plain-text body
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    MethodNotAllowed,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, format!("{}\n", message)).into_response()
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
