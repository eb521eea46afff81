//! Parser for stage tables pasted from spreadsheets or lab software
//!
//! The delimiter is chosen from the header line alone: comma, then tab,
//! then runs of two or more spaces. Header names are matched
//! case-insensitively against a fixed synonym table, every other column is
//! kept as a custom metric.

use csv::{ReaderBuilder, Trim};

use super::{ImportError, ImportOutcome, RowProblem};
use crate::models::{MetricValue, Metrics, StagePointInput};
use crate::pace::parse_pace_input;

const STAGE_HEADERS: &[&str] = &["stage", "stage_index", "stage #"];
const PACE_HEADERS: &[&str] = &["pace", "pace_seconds", "pace (m:ss)", "pace (mm:ss)"];
const SPEED_HEADERS: &[&str] = &["speed", "speed_kmh", "speed (km/h)"];
const HR_HEADERS: &[&str] = &["hr", "heart rate", "heart_rate", "bpm"];
const LACTATE_HEADERS: &[&str] = &["lactate", "lactate_mmol", "lactate (mmol/l)"];
const RPE_HEADERS: &[&str] = &["rpe"];
const COMMENT_HEADERS: &[&str] = &["comment", "comments", "notes"];

/// Field separator detected from the header line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
    /// Two or more consecutive whitespace characters
    WideSpace,
}

impl Delimiter {
    pub fn detect(header: &str) -> Self {
        if header.contains(',') {
            Delimiter::Comma
        } else if header.contains('\t') {
            Delimiter::Tab
        } else {
            Delimiter::WideSpace
        }
    }

    fn as_byte(&self) -> Option<u8> {
        match self {
            Delimiter::Comma => Some(b','),
            Delimiter::Tab => Some(b'\t'),
            Delimiter::WideSpace => None,
        }
    }
}

/// Column positions of the known fields
#[derive(Debug, Clone, Default)]
struct ColumnMap {
    stage: Option<usize>,
    pace: Option<usize>,
    speed: Option<usize>,
    hr: Option<usize>,
    lactate: Option<usize>,
    rpe: Option<usize>,
    comments: Option<usize>,
    /// (column index, metric key) for every unrecognised column
    metrics: Vec<(usize, String)>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |names: &[&str]| normalized.iter().position(|h| names.contains(&h.as_str()));

        let mut map = ColumnMap {
            stage: find(STAGE_HEADERS),
            pace: find(PACE_HEADERS),
            speed: find(SPEED_HEADERS),
            hr: find(HR_HEADERS),
            lactate: find(LACTATE_HEADERS),
            rpe: find(RPE_HEADERS),
            comments: find(COMMENT_HEADERS),
            metrics: Vec::new(),
        };

        let known = [
            map.stage,
            map.pace,
            map.speed,
            map.hr,
            map.lactate,
            map.rpe,
            map.comments,
        ];
        map.metrics = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !known.contains(&Some(*i)))
            .map(|(i, header)| {
                let key = header.trim();
                let key = if key.is_empty() {
                    format!("metric_{}", i)
                } else {
                    key.to_string()
                };
                (i, key)
            })
            .collect();

        map
    }

    fn metric_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for (_, key) in &self.metrics {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

/// Parse pasted tabular text into stage inputs.
///
/// Missing Pace or Lactate columns abort the batch before any row is read.
/// Otherwise each row is validated on its own: rejected rows are reported by
/// row number (header = row 1) and the remaining rows are still returned.
pub fn parse_import_rows(raw: &str) -> ImportOutcome {
    let mut outcome = ImportOutcome::default();

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        outcome.errors.push(ImportError::NoInput);
        return outcome;
    }

    let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        outcome.errors.push(ImportError::NoDataRows);
        return outcome;
    }

    let delimiter = Delimiter::detect(lines[0]);
    let records = split_records(&lines, delimiter);
    tracing::debug!(?delimiter, lines = lines.len(), "Parsing pasted stage table");

    let headers = &records[0];
    let columns = ColumnMap::from_headers(headers);
    outcome.metric_keys = columns.metric_keys();

    if columns.pace.is_none() {
        outcome.errors.push(ImportError::MissingPaceColumn);
    }
    if columns.lactate.is_none() {
        outcome.errors.push(ImportError::MissingLactateColumn);
    }
    if outcome.has_errors() {
        tracing::warn!(errors = ?outcome.error_messages(), "Stage table header rejected");
        return outcome;
    }

    for (position, fields) in records.iter().skip(1).enumerate() {
        let row_number = position + 2;
        match parse_row(fields, &columns, position) {
            Ok(row) => outcome.rows.push(row),
            Err(problems) => outcome.errors.push(ImportError::Row {
                row: row_number,
                problems,
            }),
        }
    }

    tracing::info!(
        rows = outcome.rows.len(),
        rejected = outcome.errors.len(),
        metrics = outcome.metric_keys.len(),
        "Parsed stage table"
    );
    outcome
}

/// Split every line into trimmed fields, one record per line
fn split_records(lines: &[&str], delimiter: Delimiter) -> Vec<Vec<String>> {
    match delimiter.as_byte() {
        Some(byte) => lines
            .iter()
            .map(|line| split_delimited(line, byte))
            .collect(),
        None => lines.iter().map(|line| split_wide_space(line)).collect(),
    }
}

fn split_delimited(line: &str, delimiter: u8) -> Vec<String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        // Unbalanced quoting and the like: fall back to a plain split
        _ => line
            .split(delimiter as char)
            .map(|field| field.trim().to_string())
            .collect(),
    }
}

fn split_wide_space(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut gap = String::new();

    for ch in line.trim().chars() {
        if ch.is_whitespace() {
            gap.push(ch);
            continue;
        }
        if !gap.is_empty() {
            if gap.chars().count() >= 2 || gap.contains('\t') {
                fields.push(std::mem::take(&mut current));
            } else {
                current.push_str(&gap);
            }
            gap.clear();
        }
        current.push(ch);
    }
    fields.push(current);
    fields
}

fn parse_row(
    fields: &[String],
    columns: &ColumnMap,
    position: usize,
) -> std::result::Result<StagePointInput, Vec<RowProblem>> {
    let cell = |idx: Option<usize>| cell_at(fields, idx);
    let mut problems = Vec::new();

    let mut metrics = Metrics::new();
    for (idx, key) in &columns.metrics {
        let raw = cell(Some(*idx));
        if !raw.is_empty() {
            metrics.insert(key.clone(), MetricValue::from_raw(raw));
        }
    }

    let stage_index = match columns.stage {
        Some(_) => parse_stage(cell(columns.stage)),
        None => u32::try_from(position).ok(),
    };
    if stage_index.is_none() {
        problems.push(RowProblem::InvalidStage);
    }

    let pace = parse_pace_input(cell(columns.pace));
    if pace.is_none() {
        problems.push(RowProblem::InvalidPace);
    }

    let lactate = parse_finite(cell(columns.lactate));
    if lactate.is_none() {
        problems.push(RowProblem::MissingLactate);
    }

    let hr = optional(cell(columns.hr), parse_heart_rate);
    if hr.is_err() {
        problems.push(RowProblem::InvalidHeartRate);
    }
    let speed = optional(cell(columns.speed), parse_finite);
    if speed.is_err() {
        problems.push(RowProblem::InvalidSpeed);
    }
    let rpe = optional(cell(columns.rpe), parse_rpe);
    if rpe.is_err() {
        problems.push(RowProblem::InvalidRpe);
    }

    let comments = Some(cell(columns.comments))
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    match (stage_index, pace, lactate, hr, speed, rpe) {
        (Some(stage_index), Some(pace), Some(lactate), Ok(hr), Ok(speed), Ok(rpe))
            if problems.is_empty() =>
        {
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
        _ => Err(problems),
    }
}

fn cell_at(fields: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| fields.get(i))
        .map(|f| f.as_str())
        .unwrap_or("")
}

/// Empty cells are absent values; anything else must parse
fn optional<T>(raw: &str, parse: fn(&str) -> Option<T>) -> std::result::Result<Option<T>, ()> {
    if raw.is_empty() {
        Ok(None)
    } else {
        parse(raw).map(Some).ok_or(())
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_stage(raw: &str) -> Option<u32> {
    let value = parse_finite(raw)?;
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return None;
    }
    Some(value as u32)
}

fn parse_heart_rate(raw: &str) -> Option<u16> {
    let value = parse_finite(raw)?;
    if value < 0.0 || value > f64::from(u16::MAX) {
        return None;
    }
    Some(value.round() as u16)
}

fn parse_rpe(raw: &str) -> Option<u8> {
    let value = parse_finite(raw)?;
    if value.fract() != 0.0 || !(1.0..=10.0).contains(&value) {
        return None;
    }
    Some(value as u8)
}
