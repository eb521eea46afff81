use serde_json::Value;
use thiserror::Error;

use crate::models::{MetricValue, Metrics, StagePointInput};
use crate::pace::parse_pace_input;

/// Reasons a manually entered stage is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("Stage index must be 0 or greater (use 0 for baseline).")]
    InvalidStage,
    #[error("Enter pace as mm:ss (e.g. 4:30).")]
    InvalidPace,
    #[error("Enter a valid lactate value.")]
    InvalidLactate,
    #[error("Heart rate must be a non-negative whole number.")]
    InvalidHeartRate,
    #[error("RPE must be a whole number from 1 to 10.")]
    InvalidRpe,
    #[error("Speed must be a number (km/h).")]
    InvalidSpeed,
    #[error("Cadence must be a positive number.")]
    InvalidCadence,
    #[error("Metrics must be valid JSON (e.g. {{\"cadence\": 172}}).")]
    InvalidMetricsJson,
    #[error("Metrics must be given as key=value.")]
    InvalidMetricPair,
}

/// A stage as typed into the entry form; every field is raw text
#[derive(Debug, Clone, Default)]
pub struct StageEntry {
    pub stage_index: i64,
    pub pace: String,
    pub lactate: String,
    pub hr: String,
    pub rpe: String,
    pub comments: String,
    pub speed: String,
    pub cadence: String,
    /// Extra metrics as a JSON object
    pub metrics: String,
}

/// Validates manual stage entries before they are upserted
pub struct StageEntryValidator;

impl StageEntryValidator {
    /// Validate an entry, reporting the first problem found
    pub fn validate(entry: &StageEntry) -> Result<StagePointInput, EntryError> {
        let stage_index = u32::try_from(entry.stage_index).map_err(|_| EntryError::InvalidStage)?;

        let pace = parse_pace_input(&entry.pace).ok_or(EntryError::InvalidPace)?;

        let lactate = parse_number(&entry.lactate)
            .filter(|lac| *lac > 0.0)
            .ok_or(EntryError::InvalidLactate)?;

        let speed = match entry.speed.trim() {
            "" => None,
            raw => Some(parse_number(raw).ok_or(EntryError::InvalidSpeed)?),
        };

        let hr = match entry.hr.trim() {
            "" => None,
            raw => Some(
                raw.parse::<u16>()
                    .map_err(|_| EntryError::InvalidHeartRate)?,
            ),
        };

        let rpe = match entry.rpe.trim() {
            "" => None,
            raw => Some(
                raw.parse::<u8>()
                    .ok()
                    .filter(|rpe| (1..=10).contains(rpe))
                    .ok_or(EntryError::InvalidRpe)?,
            ),
        };

        let metrics = Self::collect_metrics(entry)?;

        let comments = Some(entry.comments.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(StagePointInput {
            stage_index,
            pace_seconds_per_km: pace,
            speed_kmh: speed,
            lactate_mmol: lactate,
            hr_bpm: hr,
            rpe,
            comments,
            metrics,
            measured_at: None,
        })
    }

    /// Cadence first, then the JSON metrics on top of it
    fn collect_metrics(entry: &StageEntry) -> Result<Metrics, EntryError> {
        let mut metrics = Metrics::new();

        let cadence = entry.cadence.trim();
        if !cadence.is_empty() {
            let value = parse_number(cadence)
                .filter(|c| *c > 0.0)
                .ok_or(EntryError::InvalidCadence)?;
            metrics.insert("cadence".to_string(), MetricValue::Number(value));
        }

        metrics.extend(parse_metrics_json(&entry.metrics)?);
        Ok(metrics)
    }
}

/// Parse a JSON object of custom metrics; empty input means no metrics
pub fn parse_metrics_json(raw: &str) -> Result<Metrics, EntryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Metrics::new());
    }

    let parsed: Value = serde_json::from_str(trimmed).map_err(|_| EntryError::InvalidMetricsJson)?;
    let object = parsed.as_object().ok_or(EntryError::InvalidMetricsJson)?;

    let mut metrics = Metrics::new();
    for (key, value) in object {
        let metric = match value {
            Value::Null => continue,
            Value::Number(n) => match n.as_f64() {
                Some(v) => MetricValue::Number(v),
                None => MetricValue::Text(n.to_string()),
            },
            Value::String(s) => MetricValue::Text(s.clone()),
            other => MetricValue::Text(other.to_string()),
        };
        metrics.insert(key.clone(), metric);
    }
    Ok(metrics)
}

/// Parse `key=value` pairs given on the command line
pub fn parse_metric_pairs(pairs: &[String]) -> Result<Metrics, EntryError> {
    let mut metrics = Metrics::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or(EntryError::InvalidMetricPair)?;
        metrics.insert(key.trim().to_string(), MetricValue::from_raw(value.trim()));
    }
    Ok(metrics)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
