//! Session summary: headline cards and coaching takeaways for one test

use serde::{Deserialize, Serialize};

use crate::models::{LactateProtocol, StagePoint, ThresholdEstimate};
use crate::pace::pace_label;
use crate::thresholds::ThresholdEstimator;

/// Maximum number of takeaways shown for a session
pub const MAX_TAKEAWAYS: usize = 5;

/// Shown when there is not enough data for anything more specific
pub const ADD_MORE_STAGES: &str = "Add more stages for better threshold estimates.";

/// Headline card of a session summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryCard {
    pub label: String,
    pub value: String,
    pub helper: Option<String>,
}

impl SummaryCard {
    fn new(label: &str, value: String) -> Self {
        Self {
            label: label.to_string(),
            value,
            helper: None,
        }
    }

    fn with_helper(mut self, helper: String) -> Self {
        self.helper = Some(helper);
        self
    }
}

/// Aggregates over the raw points of a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Highest lactate recorded; 0.0 when there are no points
    pub max_lactate_mmol: f64,
    /// Highest heart rate among points that recorded one
    pub peak_hr_bpm: Option<u16>,
    /// Lowest seconds per kilometer among points
    pub fastest_pace_seconds_per_km: Option<f64>,
    pub stages_captured: usize,
}

impl SessionMetrics {
    pub fn from_points(points: &[StagePoint]) -> Self {
        let max_lactate_mmol = points
            .iter()
            .map(|p| p.lactate_mmol)
            .filter(|lac| lac.is_finite())
            .fold(0.0, f64::max);

        let peak_hr_bpm = points.iter().filter_map(|p| p.hr_bpm).max();

        let fastest_pace_seconds_per_km = points
            .iter()
            .map(|p| p.pace_seconds_per_km)
            .filter(|pace| pace.is_finite() && *pace > 0.0)
            .reduce(f64::min);

        Self {
            max_lactate_mmol,
            peak_hr_bpm,
            fastest_pace_seconds_per_km,
            stages_captured: points.len(),
        }
    }
}

/// Display-ready summary of a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub metrics: SessionMetrics,
    pub cards: Vec<SummaryCard>,
    pub takeaways: Vec<String>,
}

/// Build the summary of a session from its points and threshold estimates
pub fn build_summary(
    points: &[StagePoint],
    lt1: Option<&ThresholdEstimate>,
    lt2: Option<&ThresholdEstimate>,
) -> SessionSummary {
    SummaryBuilder::new(points).build(lt1, lt2)
}

/// Builder for session summaries, optionally aware of the planned protocol
pub struct SummaryBuilder<'a> {
    points: &'a [StagePoint],
    protocol: Option<&'a LactateProtocol>,
}

impl<'a> SummaryBuilder<'a> {
    pub fn new(points: &'a [StagePoint]) -> Self {
        Self {
            points,
            protocol: None,
        }
    }

    /// Report captured stages against the protocol's planned stage count
    pub fn with_protocol(mut self, protocol: &'a LactateProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Estimate both thresholds from the points and summarize
    pub fn build_with_estimates(self) -> SessionSummary {
        let thresholds = ThresholdEstimator::estimate(self.points);
        self.build(thresholds.lt1.as_ref(), thresholds.lt2.as_ref())
    }

    pub fn build(
        self,
        lt1: Option<&ThresholdEstimate>,
        lt2: Option<&ThresholdEstimate>,
    ) -> SessionSummary {
        let metrics = SessionMetrics::from_points(self.points);
        let takeaways = build_takeaways(&metrics, lt1, lt2);
        let cards = self.build_cards(&metrics, lt1, lt2);

        SessionSummary {
            metrics,
            cards,
            takeaways,
        }
    }

    fn build_cards(
        &self,
        metrics: &SessionMetrics,
        lt1: Option<&ThresholdEstimate>,
        lt2: Option<&ThresholdEstimate>,
    ) -> Vec<SummaryCard> {
        let stages = match self.protocol {
            Some(protocol) => format!("{} / {}", metrics.stages_captured, protocol.num_stages),
            None => metrics.stages_captured.to_string(),
        };

        vec![
            threshold_card("Estimated LT1", lt1),
            threshold_card("Estimated LT2", lt2),
            SummaryCard::new(
                "Max lactate",
                if metrics.stages_captured > 0 {
                    format!("{} mmol/L", metrics.max_lactate_mmol)
                } else {
                    "--".to_string()
                },
            ),
            SummaryCard::new(
                "Peak HR",
                metrics
                    .peak_hr_bpm
                    .map(|hr| format!("{} bpm", hr))
                    .unwrap_or_else(|| "--".to_string()),
            ),
            SummaryCard::new("Fastest pace", pace_label(metrics.fastest_pace_seconds_per_km)),
            SummaryCard::new("Stages captured", stages),
        ]
    }
}

fn threshold_card(label: &str, estimate: Option<&ThresholdEstimate>) -> SummaryCard {
    let hr = estimate
        .and_then(|e| e.hr_bpm)
        .filter(|hr| *hr > 0)
        .map(|hr| format!("{} bpm", hr))
        .unwrap_or_else(|| "--".to_string());
    let pace = pace_label(estimate.and_then(|e| e.pace_seconds_per_km));
    let helper = estimate
        .map(|e| e.method.description())
        .unwrap_or_else(|| "Needs HR + lactate".to_string());

    SummaryCard::new(label, format!("{} | {}", hr, pace)).with_helper(helper)
}

fn build_takeaways(
    metrics: &SessionMetrics,
    lt1: Option<&ThresholdEstimate>,
    lt2: Option<&ThresholdEstimate>,
) -> Vec<String> {
    if metrics.stages_captured == 0 {
        return vec![ADD_MORE_STAGES.to_string()];
    }

    let lt1_hr = lt1.and_then(|e| e.hr_bpm).filter(|hr| *hr > 0);
    let lt2_hr = lt2.and_then(|e| e.hr_bpm).filter(|hr| *hr > 0);

    let mut takeaways = Vec::new();
    if let Some(hr) = lt1_hr {
        takeaways.push(format!("Stable lactate until ~LT1 HR (~{} bpm).", hr));
    }
    if let Some(hr) = lt2_hr {
        takeaways.push(format!("Rapid rise near ~LT2 HR (~{} bpm).", hr));
    }
    if let Some(hr) = lt1_hr {
        takeaways.push(format!(
            "Easy running suggestion: stay below ~{} bpm (LT1 - 5 bpm).",
            hr.saturating_sub(5)
        ));
    }
    if metrics.max_lactate_mmol > 0.0 {
        takeaways.push(format!(
            "Max lactate recorded: {} mmol/L.",
            metrics.max_lactate_mmol
        ));
    }
    if let Some(pace) = metrics.fastest_pace_seconds_per_km {
        takeaways.push(format!("Fastest pace logged: {}.", pace_label(Some(pace))));
    }

    if takeaways.is_empty() {
        return vec![ADD_MORE_STAGES.to_string()];
    }
    takeaways.truncate(MAX_TAKEAWAYS);
    takeaways
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EstimationMethod;
    use chrono::Utc;

    fn point(stage: u32, lactate: f64, hr: Option<u16>, pace: f64) -> StagePoint {
        StagePoint {
            stage_index: stage,
            pace_seconds_per_km: pace,
            speed_kmh: None,
            lactate_mmol: lactate,
            hr_bpm: hr,
            rpe: None,
            comments: None,
            metrics: Default::default(),
            measured_at: Utc::now(),
        }
    }

    fn estimate(hr: Option<u16>, pace: Option<f64>, method: EstimationMethod) -> ThresholdEstimate {
        ThresholdEstimate {
            hr_bpm: hr,
            pace_seconds_per_km: pace,
            method,
        }
    }

    #[test]
    fn test_empty_session() {
        let summary = build_summary(&[], None, None);
        assert_eq!(summary.takeaways, vec![ADD_MORE_STAGES.to_string()]);
        assert_eq!(summary.metrics.max_lactate_mmol, 0.0);
        assert_eq!(summary.metrics.peak_hr_bpm, None);
        assert_eq!(summary.metrics.fastest_pace_seconds_per_km, None);

        let max_card = summary.cards.iter().find(|c| c.label == "Max lactate").unwrap();
        assert_eq!(max_card.value, "--");
        let lt1_card = &summary.cards[0];
        assert_eq!(lt1_card.value, "-- | --");
        assert_eq!(lt1_card.helper.as_deref(), Some("Needs HR + lactate"));
    }

    #[test]
    fn test_metrics_from_points() {
        let points = vec![
            point(0, 1.0, None, 420.0),
            point(1, 2.5, Some(150), 300.0),
            point(2, 4.8, Some(172), 270.0),
        ];
        let metrics = SessionMetrics::from_points(&points);
        assert_eq!(metrics.max_lactate_mmol, 4.8);
        assert_eq!(metrics.peak_hr_bpm, Some(172));
        assert_eq!(metrics.fastest_pace_seconds_per_km, Some(270.0));
        assert_eq!(metrics.stages_captured, 3);
    }

    #[test]
    fn test_peak_hr_absent_without_heart_rate() {
        let points = vec![point(0, 1.0, None, 420.0), point(1, 2.0, None, 400.0)];
        let summary = build_summary(&points, None, None);
        assert_eq!(summary.metrics.peak_hr_bpm, None);
        let card = summary.cards.iter().find(|c| c.label == "Peak HR").unwrap();
        assert_eq!(card.value, "--");
    }

    #[test]
    fn test_takeaways_in_priority_order() {
        let points = vec![point(1, 2.1, Some(150), 300.0), point(2, 4.5, Some(170), 270.0)];
        let lt1 = estimate(Some(150), Some(300.0), EstimationMethod::FirstLactateAtOrAbove2);
        let lt2 = estimate(Some(165), Some(280.0), EstimationMethod::Interpolated4Crossing);

        let summary = build_summary(&points, Some(&lt1), Some(&lt2));
        assert_eq!(
            summary.takeaways,
            vec![
                "Stable lactate until ~LT1 HR (~150 bpm).".to_string(),
                "Rapid rise near ~LT2 HR (~165 bpm).".to_string(),
                "Easy running suggestion: stay below ~145 bpm (LT1 - 5 bpm).".to_string(),
                "Max lactate recorded: 4.5 mmol/L.".to_string(),
                "Fastest pace logged: 4:30.".to_string(),
            ]
        );
    }

    #[test]
    fn test_takeaways_without_heart_rate() {
        let points = vec![point(0, 1.2, None, 400.0), point(1, 3.0, None, 330.0)];
        let summary = SummaryBuilder::new(&points).build_with_estimates();
        assert_eq!(
            summary.takeaways,
            vec![
                "Max lactate recorded: 3 mmol/L.".to_string(),
                "Fastest pace logged: 5:30.".to_string(),
            ]
        );
    }

    #[test]
    fn test_takeaways_fall_back_when_nothing_applies() {
        let points = vec![point(0, 0.0, None, 0.0)];
        let summary = build_summary(&points, None, None);
        assert_eq!(summary.takeaways, vec![ADD_MORE_STAGES.to_string()]);
    }

    #[test]
    fn test_threshold_cards() {
        let lt1 = estimate(Some(148), Some(315.0), EstimationMethod::ClosestTo2);
        let summary = build_summary(&[point(0, 1.8, Some(148), 315.0)], Some(&lt1), None);

        assert_eq!(summary.cards[0].label, "Estimated LT1");
        assert_eq!(summary.cards[0].value, "148 bpm | 5:15");
        assert_eq!(summary.cards[0].helper.as_deref(), Some("closest to 2.0"));
        assert_eq!(summary.cards[1].value, "-- | --");
    }

    #[test]
    fn test_stage_count_against_protocol() {
        let points = vec![point(0, 1.0, None, 420.0), point(1, 1.5, None, 380.0)];
        let protocol = LactateProtocol::default();
        let summary = SummaryBuilder::new(&points)
            .with_protocol(&protocol)
            .build_with_estimates();

        let card = summary.cards.iter().find(|c| c.label == "Stages captured").unwrap();
        assert_eq!(card.value, "2 / 8");
    }
}
