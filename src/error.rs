//! Error types shared by every handler in the registry

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unknown user and wrong password are deliberately indistinguishable
    #[error("Login failed: check username/password")]
    LoginFailed,

    /// Action requires the administrator role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid user input (form field, upload type, empty credentials)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage rejected a row (UNIQUE / CHECK / NOT NULL)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Nothing stored yet, nothing to export
    #[error("No data yet")]
    NoData,

    /// Whole import file could not be read or parsed
    #[error("Failed to read spreadsheet: {0}")]
    Unreadable(String),

    #[error("Classification input error: {0}")]
    Classify(#[from] crate::classify::ClassifyError),

    /// Spreadsheet or PDF rendering failed
    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Constraint(
                    message
                        .clone()
                        .unwrap_or_else(|| failure.to_string()),
                )
            }
            other => Error::Database(other),
        }
    }
}
