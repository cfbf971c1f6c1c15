//! Error type shared by every module of the crate

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Used to deserialize errors returned from the MangaDex servers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerResponseError {
    pub id: String,
    pub status: i32,
    pub title: String,
    pub detail: Option<String>,
    pub context: Option<String>,
}

/// Custom error type that contains all errors that can be emitted by this crate's functions
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("'{prefix}' is ambiguous, it matches {}", .candidates.join(", "))]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("chapter {0} has no pages")]
    NoPages(String),
    #[error("no source found for domain '{0}'")]
    UnknownDomain(String),
    #[error("failed to fetch {url}: {reason}")]
    TransportFailure { url: String, reason: String },
    #[error("{url} responded with status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("error while parsing json value")]
    ParseError,
    #[error("{} server response", .0.first().map(|e| e.status).unwrap_or_default())]
    ServerError(Vec<ServerResponseError>),
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    #[error(transparent)]
    RequestWithMiddleWareError(#[from] reqwest_middleware::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    QsError(#[from] serde_qs::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    PdfError(#[from] lopdf::Error),
    #[error(transparent)]
    PersistError(#[from] tempfile::PersistError),
    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether retrying the same request might succeed. Of the error statuses only server
    /// errors and 429 qualify
    pub fn is_transient(&self) -> bool {
        match self {
            Error::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            Error::TransportFailure { .. }
            | Error::ReqwestError(_)
            | Error::RequestWithMiddleWareError(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        let status = |status| Error::HttpStatus {
            url: "https://example.com/1.png".to_owned(),
            status,
        };

        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
        assert!(!Error::NoPages("1".to_owned()).is_transient());
    }
}

/// Type alias for the [`Result`](std::result::Result) that is used in the crate's functions
pub type Result<T> = std::result::Result<T, Error>;
