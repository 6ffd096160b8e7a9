use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Game API error: {message}")]
    Api { status: Option<u16>, message: String },

    #[error("interrupted")]
    Interrupted,

    #[error("already fetching player data, cannot accept new work")]
    Busy,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("{failed} of {total} missions failed to fetch")]
    MissionsFailed { failed: usize, total: usize },

    #[error("Export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reference data error: {0}")]
    ReferenceData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn api(message: impl Into<String>) -> Self {
        Error::Api {
            status: None,
            message: message.into(),
        }
    }

    /// True when the error came from a cancelled job rather than a real failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    /// Short form shown to the user. The full error goes to the log.
    pub fn user_message(&self) -> String {
        match self {
            Error::Api {
                status: Some(status),
                ..
            } => format!("remote request failed (HTTP {status})"),
            Error::Api { message, .. } => message.clone(),
            Error::Database(_) | Error::Migration(_) => "local database error".to_string(),
            Error::Io(e) => format!("file error: {}", e.kind()),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Api {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Export(format!("csv: {e}"))
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        Error::Export(format!("xlsx: {e}"))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Export(format!("zip: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
