//! Error types shared by every pipeline stage.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the binary to decide what to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ExternalServiceFailure,
    AlignmentMismatch,
    ResourceExhausted,
    Config,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{service} failed: {message}")]
    ExternalService { service: String, message: String },

    #[error(
        "alignment mismatch at trace word {position} ({word:?}): none of {candidates:?} matched"
    )]
    AlignmentMismatch {
        word: String,
        position: usize,
        candidates: Vec<String>,
    },

    #[error("{what} exhausted after {attempts} attempts")]
    ResourceExhausted { what: String, attempts: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::MissingFile(_) => ErrorKind::NotFound,
            Error::ExternalService { .. } => ErrorKind::ExternalServiceFailure,
            Error::AlignmentMismatch { .. } => ErrorKind::AlignmentMismatch,
            Error::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn exhausted(what: impl Into<String>, attempts: usize) -> Self {
        Self::ResourceExhausted {
            what: what.into(),
            attempts,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let service = e
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        Error::service(service, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::service("json decode", e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::service("tag database", e.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::service("wav reader", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_closed_set() {
        assert_eq!(
            Error::NotFound("post".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::service("mfa", "exit 1").kind(),
            ErrorKind::ExternalServiceFailure
        );
        assert_eq!(
            Error::exhausted("background videos", 3).kind(),
            ErrorKind::ResourceExhausted
        );
        let mismatch = Error::AlignmentMismatch {
            word: "cat".into(),
            position: 4,
            candidates: vec!["dog".into()],
        };
        assert_eq!(mismatch.kind(), ErrorKind::AlignmentMismatch);
        assert!(mismatch.to_string().contains("trace word 4"));
    }
}
