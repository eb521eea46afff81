//! Unified error hierarchy for lactrs
//!
//! Area-specific errors (import, manual entry, storage, export) fold into
//! [`LactrsError`], which carries severity and user-facing messages for the CLI.

use thiserror::Error;

use crate::database::StoreError;
use crate::export::ExportError;
use crate::import::validation::EntryError;
use crate::import::ImportError;

/// Top-level error type for all lactrs operations
#[derive(Debug, Error)]
pub enum LactrsError {
    /// Pasted/imported table could not be used
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// A manually entered stage was rejected
    #[error("Invalid stage entry: {0}")]
    Entry(#[from] EntryError),

    /// Stage point store errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// CSV/JSON export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for lactrs operations
pub type Result<T> = std::result::Result<T, LactrsError>;

impl LactrsError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LactrsError::Store(StoreError::Busy(_)) | LactrsError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LactrsError::Import(ImportError::Row { .. }) => ErrorSeverity::Warning,
            LactrsError::Import(_) => ErrorSeverity::Warning,
            LactrsError::Entry(_) => ErrorSeverity::Warning,
            LactrsError::Store(StoreError::TestNotFound(_)) => ErrorSeverity::Warning,
            LactrsError::Store(_) => ErrorSeverity::Error,
            LactrsError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            LactrsError::Import(err) => err.to_string(),
            LactrsError::Entry(err) => err.to_string(),
            LactrsError::Store(StoreError::TestNotFound(id)) => {
                format!("No lactate test with id {} was found for this user.", id)
            }
            LactrsError::Store(StoreError::Sqlite(_)) => {
                "Unable to read or write the test database. Please check your configuration."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
