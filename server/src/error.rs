use std::fmt::Display;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure of a report file request.
///
/// Every variant maps to a distinct status code. Bodies carry a short
/// message only; internal details are logged and never sent to the requester.
#[derive(Error, Debug)]
pub enum ServeError {
    /// A required parameter is missing, blank or malformed.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown project or build, or the report file does not exist.
    ///
    /// Paths escaping the report root end up here as well, with the same
    /// message a missing file would produce.
    #[error("{0}")]
    NotFound(String),

    /// Anonymous requester denied by the access gate.
    #[error("authentication required to access this report")]
    Unauthorized,

    /// Identified requester denied by the access gate.
    #[error("access to this report is denied")]
    Forbidden,

    /// A producer held the report lock longer than the configured wait.
    #[error("report is being updated, retry later")]
    LockTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServeError {
    pub fn internal<E: Display>(e: E) -> Self {
        ServeError::Internal(e.to_string())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServeError::Forbidden => StatusCode::FORBIDDEN,
            ServeError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            ServeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServeError::Internal(detail) => {
                tracing::error!("Internal error: {detail}");
                String::from("internal server error")
            }
            other => {
                tracing::info!("Request rejected ({status}): {other}");
                other.to_string()
            }
        };
        let mut res = (status, message).into_response();
        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        res
    }
}

/// Failure while bringing the service up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("catalog database error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
