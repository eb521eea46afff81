//! Lactate threshold estimation
//!
//! LT1 and LT2 are derived from the stage points of a single test. Points are
//! always considered in protocol order (ascending stage index), never by
//! lactate or pace, because intensity rises stage over stage in a ramp test.

use crate::models::{EstimationMethod, StagePoint, ThresholdEstimate};

/// Fixed lactate anchor for the aerobic threshold (mmol/L)
pub const LT1_LACTATE_MMOL: f64 = 2.0;

/// Fixed lactate anchor for the anaerobic threshold (mmol/L)
pub const LT2_LACTATE_MMOL: f64 = 4.0;

/// Both threshold estimates of a test
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Thresholds {
    pub lt1: Option<ThresholdEstimate>,
    pub lt2: Option<ThresholdEstimate>,
}

/// Stateless threshold estimation over a snapshot of stage points
pub struct ThresholdEstimator;

impl ThresholdEstimator {
    /// Estimate both thresholds at once
    pub fn estimate(points: &[StagePoint]) -> Thresholds {
        Thresholds {
            lt1: Self::estimate_lt1(points),
            lt2: Self::estimate_lt2(points),
        }
    }

    /// Estimate the first (aerobic) lactate threshold.
    ///
    /// Takes the first stage reaching 2.0 mmol/L. When the curve never gets
    /// there, the stage whose lactate is nearest 2.0 is used instead, the
    /// earliest stage winning ties. Values are reported as measured.
    pub fn estimate_lt1(points: &[StagePoint]) -> Option<ThresholdEstimate> {
        let sorted = Self::ordered_valid_points(points);

        if let Some(first_over) = sorted.iter().find(|p| p.lactate_mmol >= LT1_LACTATE_MMOL) {
            return Some(Self::estimate_at(first_over, EstimationMethod::FirstLactateAtOrAbove2));
        }

        let mut closest: Option<&StagePoint> = None;
        let mut smallest_delta = f64::INFINITY;
        for point in sorted.iter().copied() {
            let delta = (point.lactate_mmol - LT1_LACTATE_MMOL).abs();
            if delta < smallest_delta {
                closest = Some(point);
                smallest_delta = delta;
            }
        }

        closest.map(|point| Self::estimate_at(point, EstimationMethod::ClosestTo2))
    }

    /// Estimate the second (anaerobic) lactate threshold.
    ///
    /// Interpolates HR and pace across the first pair of consecutive stages
    /// where lactate crosses 4.0 mmol/L. Without a crossing, falls back to the
    /// knee: the stage right after the largest positive lactate increase.
    pub fn estimate_lt2(points: &[StagePoint]) -> Option<ThresholdEstimate> {
        let sorted = Self::ordered_valid_points(points);
        if sorted.len() < 2 {
            return None;
        }

        let crossing = sorted.windows(2).find(|pair| {
            pair[0].lactate_mmol < LT2_LACTATE_MMOL && pair[1].lactate_mmol >= LT2_LACTATE_MMOL
        });

        if let Some(pair) = crossing {
            let (low, high) = (pair[0], pair[1]);
            let ratio = Self::crossing_ratio(low.lactate_mmol, high.lactate_mmol);

            let hr = interpolate(
                low.hr_bpm.map(f64::from),
                high.hr_bpm.map(f64::from),
                ratio,
            )
            .map(|hr| hr.clamp(0.0, f64::from(u16::MAX)) as u16);
            let pace = interpolate(
                Some(low.pace_seconds_per_km),
                Some(high.pace_seconds_per_km),
                ratio,
            );

            return Some(ThresholdEstimate {
                hr_bpm: hr,
                pace_seconds_per_km: pace,
                method: EstimationMethod::Interpolated4Crossing,
            });
        }

        Self::knee_point(&sorted)
            .map(|point| Self::estimate_at(point, EstimationMethod::KneeLargestDelta))
    }

    /// Stage after the steepest rise; the earliest pair wins ties and a flat or
    /// falling curve has no knee
    fn knee_point<'a>(sorted: &[&'a StagePoint]) -> Option<&'a StagePoint> {
        let mut max_delta = 0.0;
        let mut knee = None;
        for pair in sorted.windows(2) {
            let delta = pair[1].lactate_mmol - pair[0].lactate_mmol;
            if delta > max_delta {
                max_delta = delta;
                knee = Some(pair[1]);
            }
        }
        knee
    }

    /// Position of 4.0 mmol/L between two lactate values; zero when the pair is flat
    fn crossing_ratio(low: f64, high: f64) -> f64 {
        if high == low {
            0.0
        } else {
            (LT2_LACTATE_MMOL - low) / (high - low)
        }
    }

    fn estimate_at(point: &StagePoint, method: EstimationMethod) -> ThresholdEstimate {
        ThresholdEstimate {
            hr_bpm: point.hr_bpm,
            pace_seconds_per_km: Some(point.pace_seconds_per_km)
                .filter(|pace| pace.is_finite()),
            method,
        }
    }

    /// Points with a usable lactate value, in stage order
    fn ordered_valid_points(points: &[StagePoint]) -> Vec<&StagePoint> {
        let mut sorted: Vec<&StagePoint> = points
            .iter()
            .filter(|p| p.lactate_mmol.is_finite())
            .collect();
        sorted.sort_by_key(|p| p.stage_index);
        sorted
    }
}

/// Linear interpolation that tolerates a missing side by reporting the other one
fn interpolate(a: Option<f64>, b: Option<f64>, ratio: f64) -> Option<f64> {
    let a = a.filter(|v| v.is_finite());
    let b = b.filter(|v| v.is_finite());
    match (a, b) {
        (Some(a), Some(b)) => Some((a + (b - a) * ratio).round()),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Estimate LT1 from the stage points of a test
pub fn estimate_lt1(points: &[StagePoint]) -> Option<ThresholdEstimate> {
    ThresholdEstimator::estimate_lt1(points)
}

/// Estimate LT2 from the stage points of a test
pub fn estimate_lt2(points: &[StagePoint]) -> Option<ThresholdEstimate> {
    ThresholdEstimator::estimate_lt2(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

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

    fn ramp() -> Vec<StagePoint> {
        vec![
            point(0, 1.1, Some(95), 420.0),
            point(1, 1.3, Some(135), 360.0),
            point(2, 1.6, Some(145), 330.0),
            point(3, 2.2, Some(155), 300.0),
            point(4, 3.5, Some(165), 280.0),
            point(5, 4.5, Some(175), 260.0),
        ]
    }

    #[test]
    fn test_empty_points_give_no_estimates() {
        assert_eq!(estimate_lt1(&[]), None);
        assert_eq!(estimate_lt2(&[]), None);
        assert_eq!(ThresholdEstimator::estimate(&[]), Thresholds::default());
    }

    #[test]
    fn test_lt1_first_stage_over_two() {
        let lt1 = estimate_lt1(&ramp()).unwrap();
        assert_eq!(lt1.method, EstimationMethod::FirstLactateAtOrAbove2);
        assert_eq!(lt1.hr_bpm, Some(155));
        assert_eq!(lt1.pace_seconds_per_km, Some(300.0));
    }

    #[test]
    fn test_lt1_exactly_two_counts_as_crossing() {
        let points = vec![point(0, 1.0, Some(120), 400.0), point(1, 2.0, Some(140), 350.0)];
        let lt1 = estimate_lt1(&points).unwrap();
        assert_eq!(lt1.method, EstimationMethod::FirstLactateAtOrAbove2);
        assert_eq!(lt1.hr_bpm, Some(140));
    }

    #[test]
    fn test_lt1_closest_to_two_fallback() {
        let points = vec![
            point(0, 1.0, Some(120), 400.0),
            point(1, 1.2, Some(130), 380.0),
            point(2, 1.8, Some(140), 360.0),
        ];
        let lt1 = estimate_lt1(&points).unwrap();
        assert_eq!(lt1.method, EstimationMethod::ClosestTo2);
        assert_eq!(lt1.hr_bpm, Some(140));
        assert_eq!(lt1.pace_seconds_per_km, Some(360.0));
    }

    #[test]
    fn test_lt1_closest_tie_takes_earliest_stage() {
        let points = vec![
            point(3, 1.5, Some(150), 330.0),
            point(1, 1.5, Some(130), 370.0),
            point(2, 1.2, Some(140), 350.0),
        ];
        let lt1 = estimate_lt1(&points).unwrap();
        assert_eq!(lt1.method, EstimationMethod::ClosestTo2);
        assert_eq!(lt1.hr_bpm, Some(130));
    }

    #[test]
    fn test_lt1_ignores_non_finite_lactate() {
        let points = vec![point(0, f64::NAN, Some(100), 400.0), point(1, 1.9, Some(130), 360.0)];
        let lt1 = estimate_lt1(&points).unwrap();
        assert_eq!(lt1.hr_bpm, Some(130));

        let only_nan = vec![point(0, f64::NAN, Some(100), 400.0)];
        assert_eq!(estimate_lt1(&only_nan), None);
    }

    #[test]
    fn test_lt2_interpolates_crossing() {
        let points = vec![point(3, 3.5, Some(150), 300.0), point(4, 4.5, Some(160), 280.0)];
        let lt2 = estimate_lt2(&points).unwrap();
        assert_eq!(lt2.method, EstimationMethod::Interpolated4Crossing);
        assert_eq!(lt2.hr_bpm, Some(155));
        assert_eq!(lt2.pace_seconds_per_km, Some(290.0));
    }

    #[test]
    fn test_lt2_interpolation_rounds_hr() {
        let points = vec![point(1, 3.0, Some(150), 300.0), point(2, 6.0, Some(160), 270.0)];
        // ratio = 1/3 -> 153.33 bpm, 290 s/km
        let lt2 = estimate_lt2(&points).unwrap();
        assert_eq!(lt2.hr_bpm, Some(153));
        assert_eq!(lt2.pace_seconds_per_km, Some(290.0));
    }

    #[test]
    fn test_lt2_first_crossing_wins() {
        let points = vec![
            point(0, 3.0, Some(140), 320.0),
            point(1, 5.0, Some(150), 300.0),
            point(2, 3.8, Some(152), 295.0),
            point(3, 6.0, Some(170), 270.0),
        ];
        let lt2 = estimate_lt2(&points).unwrap();
        assert_eq!(lt2.method, EstimationMethod::Interpolated4Crossing);
        assert_eq!(lt2.hr_bpm, Some(145));
    }

    #[test]
    fn test_lt2_uses_available_side_when_hr_missing() {
        let points = vec![point(1, 3.0, None, 300.0), point(2, 5.0, Some(170), 280.0)];
        let lt2 = estimate_lt2(&points).unwrap();
        assert_eq!(lt2.hr_bpm, Some(170));
        assert_eq!(lt2.pace_seconds_per_km, Some(290.0));

        let no_hr = vec![point(1, 3.0, None, 300.0), point(2, 5.0, None, 280.0)];
        assert_eq!(estimate_lt2(&no_hr).unwrap().hr_bpm, None);
    }

    #[test]
    fn test_lt2_is_order_independent() {
        let mut shuffled = ramp();
        shuffled.reverse();
        shuffled.swap(1, 4);
        assert_eq!(estimate_lt2(&shuffled), estimate_lt2(&ramp()));
        assert_eq!(estimate_lt1(&shuffled), estimate_lt1(&ramp()));
    }

    #[test]
    fn test_lt2_knee_fallback_below_four() {
        let points = vec![
            point(0, 1.0, Some(120), 400.0),
            point(1, 1.4, Some(130), 370.0),
            point(2, 2.6, Some(150), 340.0),
            point(3, 3.1, Some(160), 320.0),
        ];
        let lt2 = estimate_lt2(&points).unwrap();
        assert_eq!(lt2.method, EstimationMethod::KneeLargestDelta);
        assert_eq!(lt2.hr_bpm, Some(150));
        assert_eq!(lt2.pace_seconds_per_km, Some(340.0));
    }

    #[test]
    fn test_lt2_knee_tie_takes_earliest_pair() {
        let points = vec![
            point(0, 1.0, Some(120), 400.0),
            point(1, 2.0, Some(130), 370.0),
            point(2, 2.5, Some(140), 350.0),
            point(3, 3.5, Some(150), 330.0),
        ];
        let lt2 = estimate_lt2(&points).unwrap();
        assert_eq!(lt2.hr_bpm, Some(130));
    }

    #[test]
    fn test_lt2_knee_when_always_above_four() {
        let points = vec![
            point(0, 4.2, Some(150), 300.0),
            point(1, 5.0, Some(160), 290.0),
            point(2, 7.5, Some(170), 280.0),
        ];
        let lt2 = estimate_lt2(&points).unwrap();
        assert_eq!(lt2.method, EstimationMethod::KneeLargestDelta);
        assert_eq!(lt2.hr_bpm, Some(170));
    }

    #[test]
    fn test_lt2_flat_or_falling_curve_has_no_knee() {
        let flat = vec![point(0, 1.5, Some(120), 400.0), point(1, 1.5, Some(130), 380.0)];
        assert_eq!(estimate_lt2(&flat), None);

        let falling = vec![
            point(0, 3.0, Some(120), 400.0),
            point(1, 2.0, Some(130), 380.0),
            point(2, 1.5, Some(140), 360.0),
        ];
        assert_eq!(estimate_lt2(&falling), None);
    }

    #[test]
    fn test_lt2_needs_two_points() {
        assert_eq!(estimate_lt2(&[point(0, 5.0, Some(170), 260.0)]), None);
    }

    #[test]
    fn test_crossing_ratio_flat_pair_is_zero() {
        assert_eq!(ThresholdEstimator::crossing_ratio(4.0, 4.0), 0.0);
        assert_eq!(ThresholdEstimator::crossing_ratio(3.0, 5.0), 0.5);
    }

    proptest! {
        #[test]
        fn test_estimates_ignore_input_order(
            lactates in proptest::collection::vec(0.5f64..12.0, 0..12),
            rotation in 0usize..12,
        ) {
            let points: Vec<StagePoint> = lactates
                .iter()
                .enumerate()
                .map(|(i, lac)| point(i as u32, *lac, Some(110 + i as u16 * 5), 420.0 - i as f64 * 10.0))
                .collect();

            let mut rotated = points.clone();
            if !rotated.is_empty() {
                let by = rotation % rotated.len();
                rotated.rotate_left(by);
            }

            prop_assert_eq!(estimate_lt1(&rotated), estimate_lt1(&points));
            prop_assert_eq!(estimate_lt2(&rotated), estimate_lt2(&points));
        }

        #[test]
        fn test_lt1_without_crossing_is_closest_to_two(
            lactates in proptest::collection::vec(0.5f64..1.99, 1..10),
        ) {
            let points: Vec<StagePoint> = lactates
                .iter()
                .enumerate()
                .map(|(i, lac)| point(i as u32, *lac, Some(100 + i as u16), 400.0))
                .collect();

            let lt1 = estimate_lt1(&points).unwrap();
            prop_assert_eq!(lt1.method, EstimationMethod::ClosestTo2);

            let best = lactates
                .iter()
                .map(|lac| (lac - 2.0).abs())
                .fold(f64::INFINITY, f64::min);
            let expected = lactates
                .iter()
                .position(|lac| (lac - 2.0).abs() == best)
                .unwrap();
            prop_assert_eq!(lt1.hr_bpm, Some(100 + expected as u16));
        }

        #[test]
        fn test_lt2_crossing_stays_between_neighbours(
            low in 0.5f64..3.99,
            high in 4.0f64..10.0,
            hr_low in 120u16..170,
            hr_step in 1u16..30,
        ) {
            let points = vec![
                point(0, low, Some(hr_low), 320.0),
                point(1, high, Some(hr_low + hr_step), 280.0),
            ];
            let lt2 = estimate_lt2(&points).unwrap();
            prop_assert_eq!(lt2.method, EstimationMethod::Interpolated4Crossing);
            let hr = lt2.hr_bpm.unwrap();
            prop_assert!(hr >= hr_low && hr <= hr_low + hr_step);
            let pace = lt2.pace_seconds_per_km.unwrap();
            prop_assert!((280.0..=320.0).contains(&pace));
        }
    }
}
