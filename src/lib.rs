// Library interface for lactrs modules
// This allows integration tests and benches to access the core functionality

pub mod config;
pub mod database;
pub mod display;
pub mod error;
pub mod export;
pub mod identity;
pub mod import;
pub mod logging;
pub mod models;
pub mod pace;
pub mod reconcile;
pub mod summary;
pub mod thresholds;

// Re-export commonly used types for convenience
pub use models::*;
pub use thresholds::{estimate_lt1, estimate_lt2, ThresholdEstimator, Thresholds};
pub use summary::{build_summary, SessionSummary, SummaryBuilder, SummaryCard};
pub use import::{parse_import_rows, ImportError, ImportOutcome, RowProblem};
pub use reconcile::reconcile_points;
pub use database::{PointStore, SqliteStore, StoreError};
pub use error::{LactrsError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat};
