use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::models::StagePointInput;

pub mod paste;
pub mod validation;

pub use paste::parse_import_rows;

/// Problems that make an imported table, or one of its rows, unusable
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    /// Nothing was pasted
    #[error("Paste rows with a header first.")]
    NoInput,

    /// Only a header line was supplied
    #[error("Include a header row and at least one data row.")]
    NoDataRows,

    #[error("Header must include a Pace column (mm:ss).")]
    MissingPaceColumn,

    #[error("Header must include a Lactate column.")]
    MissingLactateColumn,

    /// A data row was rejected; `row` is 1-based with the header as row 1
    #[error("Row {row}: {}", join_problems(.problems))]
    Row { row: usize, problems: Vec<RowProblem> },
}

impl ImportError {
    /// Header-level errors abort the whole batch
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ImportError::Row { .. })
    }
}

/// Reason a single imported row was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowProblem {
    #[error("Stage must be 0 or greater.")]
    InvalidStage,
    #[error("Invalid pace (mm:ss).")]
    InvalidPace,
    #[error("Missing lactate value.")]
    MissingLactate,
    #[error("Heart rate must be a non-negative number.")]
    InvalidHeartRate,
    #[error("Speed must be a number (km/h).")]
    InvalidSpeed,
    #[error("RPE must be a whole number from 1 to 10.")]
    InvalidRpe,
}

fn join_problems(problems: &[RowProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of parsing a pasted or imported table.
///
/// Rows that parsed cleanly are returned alongside the errors of the rows
/// that did not; header-level errors leave `rows` empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub rows: Vec<StagePointInput>,
    pub errors: Vec<ImportError>,
    /// Column headers that were kept as custom metrics, in header order
    pub metric_keys: Vec<String>,
}

impl ImportOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// True when the header itself was unusable and no row was processed
    pub fn is_fatal(&self) -> bool {
        self.errors.iter().any(ImportError::is_fatal)
    }

    /// Error texts as shown to the user
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    pub fn report(&self) -> ImportReport {
        ImportReport {
            imported_rows: self.rows.len(),
            rejected_rows: self
                .errors
                .iter()
                .filter(|e| matches!(e, ImportError::Row { .. }))
                .count(),
            errors: self.error_messages(),
            metric_keys: self.metric_keys.clone(),
        }
    }
}

/// Serializable digest of an import, for logs and JSON output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported_rows: usize,
    pub rejected_rows: usize,
    pub errors: Vec<String>,
    pub metric_keys: Vec<String>,
}

/// File extensions accepted by [`import_file`]
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Check whether a file looks like a stage table we can read
pub fn can_import(file_path: &Path) -> bool {
    file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read a delimited stage table from disk
pub fn import_file(file_path: &Path) -> std::io::Result<ImportOutcome> {
    let raw = fs::read_to_string(file_path)?;
    tracing::info!(file = %file_path.display(), bytes = raw.len(), "Reading stage table");
    Ok(parse_import_rows(&raw))
}

/// Read a delimited stage table from any reader (stdin for pasted text)
pub fn import_reader<R: Read>(mut reader: R) -> std::io::Result<ImportOutcome> {
    let mut raw = String::new();
    reader.read_to_string(&mut raw)?;
    Ok(parse_import_rows(&raw))
}
