use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{LactateTest, StagePoint, ThresholdEstimate};
use crate::summary::{SessionSummary, SummaryBuilder};
use crate::thresholds::ThresholdEstimator;

pub mod csv;
pub mod json;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Stage table that can be imported again
    Csv,
    /// Full report with thresholds and summary
    Json,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl ExportFormat {
    /// Guess the format from an output file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Everything known about one test, ready to serialize
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub test: LactateTest,
    pub points: Vec<StagePoint>,
    pub lt1: Option<ThresholdEstimate>,
    pub lt2: Option<ThresholdEstimate>,
    pub summary: SessionSummary,
}

impl TestReport {
    /// Estimate thresholds and summarize `points` for `test`
    pub fn new(test: LactateTest, mut points: Vec<StagePoint>) -> Self {
        points.sort_by_key(|p| p.stage_index);

        let thresholds = ThresholdEstimator::estimate(&points);
        let summary = SummaryBuilder::new(&points)
            .with_protocol(&test.protocol)
            .build(thresholds.lt1.as_ref(), thresholds.lt2.as_ref());

        Self {
            test,
            points,
            lt1: thresholds.lt1,
            lt2: thresholds.lt2,
            summary,
        }
    }
}
