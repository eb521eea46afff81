//! Merging stage points into the in-memory collection of a test
//!
//! A test holds at most one point per stage index. Incoming points replace
//! existing ones at the same stage wholesale, there is no field-level merge.

use std::collections::BTreeMap;

use crate::models::StagePoint;

/// Merge `incoming` into `existing`, last write wins per stage index.
///
/// The result is sorted ascending by stage index.
pub fn reconcile_points(existing: &[StagePoint], incoming: &[StagePoint]) -> Vec<StagePoint> {
    let mut by_stage: BTreeMap<u32, StagePoint> = BTreeMap::new();
    for point in existing.iter().chain(incoming) {
        by_stage.insert(point.stage_index, point.clone());
    }

    let merged: Vec<StagePoint> = by_stage.into_values().collect();
    tracing::debug!(
        existing = existing.len(),
        incoming = incoming.len(),
        merged = merged.len(),
        "Reconciled stage points"
    );
    merged
}

/// Merge a single saved point into the collection in place
pub fn merge_saved_point(points: &mut Vec<StagePoint>, saved: StagePoint) {
    points.retain(|p| p.stage_index != saved.stage_index);
    points.push(saved);
    points.sort_by_key(|p| p.stage_index);
}

/// Stage index that should be offered for the next manual entry
pub fn next_stage_index(points: &[StagePoint]) -> u32 {
    points
        .iter()
        .map(|p| p.stage_index)
        .max()
        .map(|last| last + 1)
        .unwrap_or(0)
}
