use std::path::PathBuf;
use thiserror::Error;

use crate::types::SessionKey;

/// Failures raised while resolving a session's metadata or source container.
#[derive(Error, Debug)]
pub enum LookupError {
    /// No metadata row matches the key
    #[error("no metadata row for {0}")]
    MetadataNotFound(SessionKey),

    /// More than one metadata row matches the key
    #[error("{count} metadata rows for {key}; expected exactly one")]
    AmbiguousMetadata { key: SessionKey, count: usize },

    /// The source container for a requested session does not exist
    #[error("source container not found: {}", .0.display())]
    ContainerNotFound(PathBuf),
}

/// Custom error types for the converter.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// A date or time value could not be parsed
    #[error("invalid timestamp '{value}': {reason}")]
    Parse { value: String, reason: String },

    /// The metadata table is missing columns or holds malformed values
    #[error("metadata schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Two source files resolve to the same (subject, session) pair
    #[error(
        "subject {subject:02} session {session:02} found twice: {} and {}",
        .first.display(),
        .second.display()
    )]
    DuplicateSession {
        subject: u32,
        session: u32,
        first: PathBuf,
        second: PathBuf,
    },

    /// The file is not a readable source container
    #[error("invalid source container {}: {reason}", .path.display())]
    InvalidContainer { path: PathBuf, reason: String },

    /// The output document was assembled inconsistently
    #[error("output document error: {0}")]
    Document(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "nwb-support")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl ConversionError {
    pub(crate) fn parse(value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::Parse {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is confined to the session that raised it.
    ///
    /// A batch run records these and moves on; anything else (unreadable
    /// metadata table, colliding discovery entries, bad configuration)
    /// aborts the whole run.
    pub fn is_session_failure(&self) -> bool {
        match self {
            ConversionError::Parse { .. }
            | ConversionError::Lookup(_)
            | ConversionError::InvalidContainer { .. }
            | ConversionError::Document(_)
            | ConversionError::Io(_)
            | ConversionError::Json(_) => true,
            #[cfg(feature = "nwb-support")]
            ConversionError::Hdf5(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_errors_are_session_failures() {
        let key = SessionKey::new(1, 2, "demo");
        let err: ConversionError = LookupError::MetadataNotFound(key).into();
        assert!(err.is_session_failure());
        assert!(err.to_string().contains("subject 01 session 02"));
    }

    #[test]
    fn test_schema_errors_abort_batch() {
        let err = ConversionError::Schema("missing column 'Dataset'".to_string());
        assert!(!err.is_session_failure());
    }

    #[test]
    fn test_duplicate_session_message_names_both_files() {
        let err = ConversionError::DuplicateSession {
            subject: 1,
            session: 2,
            first: PathBuf::from("a.h5"),
            second: PathBuf::from("b.h5"),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.h5") && msg.contains("b.h5"));
        assert!(!err.is_session_failure());
    }
}
