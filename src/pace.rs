//! Pace parsing and formatting helpers
//!
//! Paces are stored as seconds per kilometer and shown as `m:ss`.

/// Parse a pace typed as `m:ss` or as a bare number of seconds.
///
/// Returns the pace rounded to whole seconds, or `None` when the input
/// is empty or not a valid pace.
pub fn parse_pace_input(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    match parts.as_slice() {
        [seconds] => {
            let seconds = parse_number(seconds)?;
            (seconds > 0.0).then(|| seconds.round())
        }
        [minutes, seconds] => {
            let minutes = parse_number(minutes)?;
            let seconds = parse_number(seconds)?;
            if minutes >= 0.0 && (0.0..60.0).contains(&seconds) {
                Some((minutes * 60.0 + seconds).round())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Format seconds per kilometer as `m:ss/km`, or `--` when unknown
pub fn format_pace(seconds_per_km: f64) -> String {
    if seconds_per_km.is_nan() || seconds_per_km <= 0.0 || seconds_per_km.is_infinite() {
        return "--".to_string();
    }
    format!("{}/km", format_duration(seconds_per_km))
}

/// Pace without the unit suffix, as shown in tables and summary cards
pub fn pace_label(seconds_per_km: Option<f64>) -> String {
    match seconds_per_km {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => format_duration(seconds),
        _ => "--".to_string(),
    }
}

/// Format a duration in seconds as `m:ss`, clamping negatives to zero
pub fn format_duration(total_seconds: f64) -> String {
    let clamped = if total_seconds.is_finite() {
        total_seconds.round().max(0.0) as u64
    } else {
        0
    };
    format!("{}:{:02}", clamped / 60, clamped % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minutes_seconds() {
        assert_eq!(parse_pace_input("4:30"), Some(270.0));
        assert_eq!(parse_pace_input(" 5:05 "), Some(305.0));
        assert_eq!(parse_pace_input("0:59"), Some(59.0));
    }

    #[test]
    fn test_parse_bare_seconds() {
        assert_eq!(parse_pace_input("270"), Some(270.0));
        assert_eq!(parse_pace_input("269.6"), Some(270.0));
        assert_eq!(parse_pace_input("0"), None);
        assert_eq!(parse_pace_input("-10"), None);
    }

    #[test]
    fn test_parse_rejects_invalid_pace() {
        assert_eq!(parse_pace_input(""), None);
        assert_eq!(parse_pace_input("bad"), None);
        assert_eq!(parse_pace_input("4:60"), None);
        assert_eq!(parse_pace_input("-1:30"), None);
        assert_eq!(parse_pace_input("1:02:03"), None);
        assert_eq!(parse_pace_input("4:"), None);
    }

    #[test]
    fn test_format_pace() {
        assert_eq!(format_pace(270.0), "4:30/km");
        assert_eq!(format_pace(305.0), "5:05/km");
        assert_eq!(format_pace(0.0), "--");
        assert_eq!(format_pace(f64::NAN), "--");
        assert_eq!(pace_label(Some(240.0)), "4:00");
        assert_eq!(pace_label(None), "--");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(600.0), "10:00");
        assert_eq!(format_duration(-5.0), "0:00");
        assert_eq!(format_duration(59.6), "1:00");
    }
}
