//! Unified error handling for Warden.
//!
//! This module defines [`WardenError`], the single error type returned by the
//! fallible parts of the analyzer: scan-buffer creation, configuration loading
//! and reads against a session that has not been parsed yet.
//!
//! Syntax errors are deliberately *not* represented here. A query that fails
//! to parse is still a fully usable session; its outcome is reported through
//! [`crate::ParseStatus`] instead.
//!
//! A convenience [`Result<T>`] type alias is re-exported so that callers can
//! write `Result<T>` instead of `std::result::Result<T, WardenError>`.

use std::io;

use thiserror::Error;

/// The canonical error type for all Warden operations.
#[derive(Debug, Error)]
pub enum WardenError {
    /// The scan buffer for a query could not be created. The session was
    /// never constructed and nothing is returned to the caller.
    #[error("scan buffer initialization failed: {0}")]
    ScanInit(String),

    /// A result accessor was called before [`crate::QuerySession::parse`].
    /// This is a lifecycle misuse by the caller, not a property of the input.
    #[error("query session has not been parsed")]
    NotParsed,

    /// The analyzer configuration is malformed or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An I/O error raised while reading a configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        WardenError::Config(err.to_string())
    }
}

/// A specialised [`Result`] type for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_via_question_mark() {
        fn might_fail() -> Result<()> {
            let _f = std::fs::File::open("/non/existent/path/warden_test")?;
            Ok(())
        }

        let err = might_fail().unwrap_err();
        assert!(matches!(err, WardenError::Io(_)));
    }

    #[test]
    fn toml_errors_become_config_errors() {
        let err: WardenError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, WardenError::Config(_)));
    }

    #[test]
    fn display_messages_are_human_readable() {
        let cases: Vec<(WardenError, &str)> = vec![
            (
                WardenError::ScanInit("query contains a NUL byte".into()),
                "scan buffer initialization failed: query contains a NUL byte",
            ),
            (WardenError::NotParsed, "query session has not been parsed"),
            (
                WardenError::Config("max_query_len must be non-zero".into()),
                "invalid configuration: max_query_len must be non-zero",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn error_source_chains_io_errors() {
        use std::error::Error;

        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = WardenError::Io(io_err);
        assert!(err.source().is_some());
        assert!(WardenError::NotParsed.source().is_none());
    }
}
