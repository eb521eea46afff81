//! Terminal rendering of tests, points and summaries

use colored::*;
use tabled::{settings::Style, Table, Tabled};

use crate::import::ImportReport;
use crate::models::{LactateTest, StagePoint};
use crate::pace::pace_label;
use crate::summary::SessionSummary;

#[derive(Tabled)]
struct TestRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "Stage")]
    stage: u32,
    #[tabled(rename = "Pace")]
    pace: String,
    #[tabled(rename = "Lactate")]
    lactate: String,
    #[tabled(rename = "HR")]
    hr: String,
    #[tabled(rename = "RPE")]
    rpe: String,
    #[tabled(rename = "Speed")]
    speed: String,
    #[tabled(rename = "Comments")]
    comments: String,
    #[tabled(rename = "Metrics")]
    metrics: String,
}

#[derive(Tabled)]
struct CardRow {
    #[tabled(rename = "Metric")]
    label: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Method")]
    helper: String,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "--".to_string(), |v| v.to_string())
}

pub fn render_tests(tests: &[LactateTest]) -> String {
    if tests.is_empty() {
        return "No lactate tests yet. Create one with `lactrs new`.".to_string();
    }

    let rows = tests.iter().map(|test| TestRow {
        id: test.id.clone(),
        title: test.title.clone(),
        created: test.created_at.format("%Y-%m-%d %H:%M").to_string(),
        status: match test.completed_at {
            Some(at) => format!("completed {}", at.format("%Y-%m-%d")),
            None => "in progress".to_string(),
        },
    });

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Header lines for one test
pub fn render_test_header(test: &LactateTest) -> String {
    let mut out = format!("{}\n", test.title.bold());
    out.push_str(&format!("  id:       {}\n", test.id));
    out.push_str(&format!(
        "  protocol: {} x {}s stages after {}s warmup\n",
        test.protocol.num_stages, test.protocol.stage_seconds, test.protocol.warmup_seconds
    ));
    out.push_str(&format!(
        "  status:   {}\n",
        if test.is_completed() {
            "completed".green()
        } else {
            "in progress".yellow()
        }
    ));
    if let Some(notes) = test.notes.as_deref().filter(|n| !n.is_empty()) {
        out.push_str(&format!("  notes:    {}\n", notes));
    }
    out
}

pub fn render_points(points: &[StagePoint]) -> String {
    if points.is_empty() {
        return "No stages recorded.".to_string();
    }

    let rows = points.iter().map(|point| PointRow {
        stage: point.stage_index,
        pace: pace_label(Some(point.pace_seconds_per_km)),
        lactate: format!("{:.1}", point.lactate_mmol),
        hr: or_dash(point.hr_bpm),
        rpe: or_dash(point.rpe),
        speed: or_dash(point.speed_kmh.map(|s| format!("{:.1}", s))),
        comments: point.comments.clone().unwrap_or_default(),
        metrics: point
            .metrics
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" "),
    });

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_summary(summary: &SessionSummary) -> String {
    let rows = summary.cards.iter().map(|card| CardRow {
        label: card.label.clone(),
        value: card.value.clone(),
        helper: card.helper.clone().unwrap_or_default(),
    });

    let mut out = Table::new(rows).with(Style::rounded()).to_string();
    out.push_str(&format!("\n\n{}\n", "Takeaways".bold()));
    for takeaway in &summary.takeaways {
        out.push_str(&format!("  • {}\n", takeaway));
    }
    out
}

pub fn render_import_report(report: &ImportReport) -> String {
    let mut out = format!(
        "{} {} row(s)",
        "Imported".green().bold(),
        report.imported_rows
    );
    if report.rejected_rows > 0 {
        out.push_str(&format!(", {} rejected", report.rejected_rows.to_string().red()));
    }
    if !report.metric_keys.is_empty() {
        out.push_str(&format!("\n  custom metrics: {}", report.metric_keys.join(", ")));
    }
    for error in &report.errors {
        out.push_str(&format!("\n  {} {}", "!".yellow(), error));
    }
    out
}
