use super::ExportError;
use crate::models::StagePoint;
use crate::pace::format_duration;
use csv::{QuoteStyle, WriterBuilder};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// Fixed leading columns; custom metric columns follow in key order
pub const BASE_COLUMNS: &[&str] = &["stage", "pace", "lactate", "hr", "rpe", "speed", "comments"];

/// Write points as a stage table that [`crate::import::parse_import_rows`] reads back
pub fn write_points<W: Write>(points: &[StagePoint], writer: W) -> Result<(), ExportError> {
    let metric_keys: BTreeSet<&str> = points
        .iter()
        .flat_map(|p| p.metrics.keys().map(String::as_str))
        .collect();

    let mut csv_writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(writer);

    let mut header: Vec<&str> = BASE_COLUMNS.to_vec();
    header.extend(metric_keys.iter().copied());
    csv_writer.write_record(&header)?;

    let mut ordered: Vec<&StagePoint> = points.iter().collect();
    ordered.sort_by_key(|p| p.stage_index);

    for point in ordered {
        let mut record = vec![
            point.stage_index.to_string(),
            format_duration(point.pace_seconds_per_km),
            point.lactate_mmol.to_string(),
            optional_cell(point.hr_bpm),
            optional_cell(point.rpe),
            optional_cell(point.speed_kmh),
            point.comments.clone().unwrap_or_default(),
        ];
        record.extend(
            metric_keys
                .iter()
                .map(|key| optional_cell(point.metrics.get(*key))),
        );
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    tracing::debug!(points = points.len(), metrics = metric_keys.len(), "Wrote stage CSV");
    Ok(())
}

/// Export points to a CSV file
pub fn export_points<P: AsRef<Path>>(points: &[StagePoint], output_path: P) -> Result<(), ExportError> {
    let file = std::fs::File::create(output_path)?;
    write_points(points, file)
}

fn optional_cell<T: ToString>(value: Option<T>) -> String {
    value.map_or(String::new(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::parse_import_rows;
    use crate::models::{MetricValue, Metrics};
    use chrono::Utc;
    use tempfile::NamedTempFile;

    fn point(stage: u32, pace: f64, lactate: f64) -> StagePoint {
        StagePoint {
            stage_index: stage,
            pace_seconds_per_km: pace,
            speed_kmh: None,
            lactate_mmol: lactate,
            hr_bpm: None,
            rpe: None,
            comments: None,
            metrics: Metrics::new(),
            measured_at: Utc::now(),
        }
    }

    #[test]
    fn test_header_and_rows() {
        let mut second = point(1, 270.0, 2.4);
        second.hr_bpm = Some(158);
        second
            .metrics
            .insert("cadence".to_string(), MetricValue::Number(172.0));
        let points = vec![second, point(0, 330.0, 1.1)];

        let mut buffer = Vec::new();
        write_points(&points, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "stage,pace,lactate,hr,rpe,speed,comments,cadence");
        assert_eq!(lines[1], "0,5:30,1.1,,,,,");
        assert_eq!(lines[2], "1,4:30,2.4,158,,,,172");
    }

    #[test]
    fn test_export_reimports() {
        let mut first = point(0, 330.0, 1.1);
        first.comments = Some("easy, relaxed".to_string());
        let mut second = point(1, 270.0, 2.4);
        second.hr_bpm = Some(158);
        second.rpe = Some(6);
        second.speed_kmh = Some(13.3);
        second
            .metrics
            .insert("surface".to_string(), MetricValue::Text("track".to_string()));

        let temp_file = NamedTempFile::new().unwrap();
        export_points(&[first, second], temp_file.path()).unwrap();

        let raw = std::fs::read_to_string(temp_file.path()).unwrap();
        let outcome = parse_import_rows(&raw);

        assert!(!outcome.has_errors(), "{:?}", outcome.errors);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0].stage_index, 0);
        assert_eq!(outcome.rows[0].comments.as_deref(), Some("easy, relaxed"));
        assert_eq!(outcome.rows[1].pace_seconds_per_km, 270.0);
        assert_eq!(outcome.rows[1].lactate_mmol, 2.4);
        assert_eq!(outcome.rows[1].hr_bpm, Some(158));
        assert_eq!(outcome.rows[1].rpe, Some(6));
        assert_eq!(outcome.rows[1].speed_kmh, Some(13.3));
        assert_eq!(
            outcome.rows[1].metrics.get("surface"),
            Some(&MetricValue::Text("track".to_string()))
        );
        assert!(!outcome.rows[0].metrics.contains_key("surface"));
    }
}
