use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value of a free-form stage metric (cadence, ground contact time, notes...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Coerce raw text to a number when it parses as a finite one, else keep the text
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => MetricValue::Number(value),
            _ => MetricValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(value) => Some(*value),
            MetricValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(value) => write!(f, "{}", value),
            MetricValue::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Custom metrics keyed by their column/header name
pub type Metrics = BTreeMap<String, MetricValue>;

/// One lactate measurement taken at one stage of a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePoint {
    /// Stage number, 0 is the resting/baseline sample
    pub stage_index: u32,

    /// Pace in seconds per kilometer (lower is faster)
    pub pace_seconds_per_km: f64,

    /// Alternate pace representation in km/h
    pub speed_kmh: Option<f64>,

    /// Blood lactate concentration in mmol/L
    pub lactate_mmol: f64,

    /// Heart rate in beats per minute
    pub hr_bpm: Option<u16>,

    /// Rated perceived exertion (1-10)
    pub rpe: Option<u8>,

    pub comments: Option<String>,

    #[serde(default)]
    pub metrics: Metrics,

    /// When the sample was captured
    pub measured_at: DateTime<Utc>,
}

/// Stage data as entered or imported, before it has been stored
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePointInput {
    pub stage_index: u32,
    pub pace_seconds_per_km: f64,
    pub speed_kmh: Option<f64>,
    pub lactate_mmol: f64,
    pub hr_bpm: Option<u16>,
    pub rpe: Option<u8>,
    pub comments: Option<String>,
    #[serde(default)]
    pub metrics: Metrics,
    pub measured_at: Option<DateTime<Utc>>,
}

impl StagePointInput {
    /// Materialize the input as a full record, stamping `now` when no capture time was given
    pub fn into_point(self, now: DateTime<Utc>) -> StagePoint {
        StagePoint {
            stage_index: self.stage_index,
            pace_seconds_per_km: self.pace_seconds_per_km,
            speed_kmh: self.speed_kmh,
            lactate_mmol: self.lactate_mmol,
            hr_bpm: self.hr_bpm,
            rpe: self.rpe,
            comments: self.comments,
            metrics: self.metrics,
            measured_at: self.measured_at.unwrap_or(now),
        }
    }
}

impl From<StagePoint> for StagePointInput {
    fn from(point: StagePoint) -> Self {
        StagePointInput {
            stage_index: point.stage_index,
            pace_seconds_per_km: point.pace_seconds_per_km,
            speed_kmh: point.speed_kmh,
            lactate_mmol: point.lactate_mmol,
            hr_bpm: point.hr_bpm,
            rpe: point.rpe,
            comments: point.comments,
            metrics: point.metrics,
            measured_at: Some(point.measured_at),
        }
    }
}

/// Rule that produced a threshold estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimationMethod {
    /// First stage at or above 2.0 mmol/L
    #[serde(rename = "first-lactate>=2.0")]
    FirstLactateAtOrAbove2,
    /// Stage with lactate nearest 2.0 mmol/L
    #[serde(rename = "closest-to-2.0")]
    ClosestTo2,
    /// Linear interpolation across the 4.0 mmol/L crossing
    #[serde(rename = "interpolated-4.0-crossing")]
    Interpolated4Crossing,
    /// Stage after the steepest lactate rise
    #[serde(rename = "knee-largest-delta")]
    KneeLargestDelta,
}

impl EstimationMethod {
    pub fn tag(&self) -> &'static str {
        match self {
            EstimationMethod::FirstLactateAtOrAbove2 => "first-lactate>=2.0",
            EstimationMethod::ClosestTo2 => "closest-to-2.0",
            EstimationMethod::Interpolated4Crossing => "interpolated-4.0-crossing",
            EstimationMethod::KneeLargestDelta => "knee-largest-delta",
        }
    }

    /// Tag rendered for people ("closest to 2.0")
    pub fn description(&self) -> String {
        self.tag().replace('-', " ")
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Heart rate and pace at an estimated lactate threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEstimate {
    pub hr_bpm: Option<u16>,
    pub pace_seconds_per_km: Option<f64>,
    pub method: EstimationMethod,
}

/// Timing of a graded running test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LactateProtocol {
    pub warmup_seconds: u32,
    pub stage_seconds: u32,
    pub num_stages: u32,
    /// Offset into a stage at which the sample is taken
    pub sample_offset_seconds: u32,
    pub sample_window_seconds: u32,
}

impl Default for LactateProtocol {
    fn default() -> Self {
        Self {
            warmup_seconds: 600,
            stage_seconds: 180,
            num_stages: 8,
            sample_offset_seconds: 150,
            sample_window_seconds: 30,
        }
    }
}

pub const DEFAULT_TEST_TITLE: &str = "Lactate Threshold Test";

/// A lactate test session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LactateTest {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub sport: String,
    pub protocol: LactateProtocol,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LactateTest {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Options for creating a new test session
#[derive(Debug, Clone, Default)]
pub struct NewTest {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub protocol: Option<LactateProtocol>,
}
