use super::{ExportError, TestReport};
use std::io::Write;
use std::path::Path;

/// Write a test report as pretty JSON
pub fn write_report<W: Write>(report: &TestReport, mut writer: W) -> Result<(), ExportError> {
    let json_data = serde_json::to_string_pretty(report)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    writer.write_all(json_data.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Export any serializable data structure to JSON
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<(), ExportError>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let json_data = serde_json::to_string_pretty(data)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    let mut file = std::fs::File::create(output_path)?;
    file.write_all(json_data.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LactateProtocol, LactateTest, StagePoint};
    use chrono::Utc;
    use tempfile::NamedTempFile;

    fn point(stage: u32, pace: f64, lactate: f64, hr: u16) -> StagePoint {
        StagePoint {
            stage_index: stage,
            pace_seconds_per_km: pace,
            speed_kmh: None,
            lactate_mmol: lactate,
            hr_bpm: Some(hr),
            rpe: None,
            comments: None,
            metrics: Default::default(),
            measured_at: Utc::now(),
        }
    }

    fn test_session() -> LactateTest {
        LactateTest {
            id: "test-1".to_string(),
            owner_id: "athlete".to_string(),
            title: "Track session".to_string(),
            sport: "run".to_string(),
            protocol: LactateProtocol::default(),
            started_at: None,
            completed_at: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_report_json_shape() {
        let points = vec![
            point(2, 270.0, 4.5, 170),
            point(0, 330.0, 1.2, 130),
            point(1, 300.0, 2.1, 150),
        ];
        let report = TestReport::new(test_session(), points);

        let mut buffer = Vec::new();
        write_report(&report, &mut buffer).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        assert_eq!(value["test"]["id"], "test-1");
        assert_eq!(value["points"][0]["stage_index"], 0);
        assert_eq!(value["lt1"]["method"], "first-lactate>=2.0");
        assert_eq!(value["lt1"]["hr_bpm"], 150);
        assert_eq!(value["lt2"]["method"], "interpolated-4.0-crossing");
        assert_eq!(value["summary"]["cards"][0]["label"], "Estimated LT1");
        assert_eq!(value["summary"]["cards"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn test_report_without_points() {
        let report = TestReport::new(test_session(), Vec::new());
        let mut buffer = Vec::new();
        write_report(&report, &mut buffer).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        assert!(value["lt1"].is_null());
        assert!(value["lt2"].is_null());
        assert_eq!(
            value["summary"]["takeaways"][0],
            crate::summary::ADD_MORE_STAGES
        );
    }

    #[test]
    fn test_export_json_to_file() {
        let report = TestReport::new(test_session(), vec![point(0, 330.0, 1.2, 130)]);
        let temp_file = NamedTempFile::new().unwrap();

        export_json(&report, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("\"title\": \"Track session\""));
    }
}
