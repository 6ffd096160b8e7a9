use chrono::{DateTime, NaiveDateTime, Utc};

/// Fixed-width timestamp embedded in export filenames.
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Convert a (possibly fractional) unix timestamp in seconds.
pub fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, empty when the timestamp is out of range.
pub fn format_unix_seconds(seconds: f64) -> String {
    from_unix_seconds(seconds)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

pub fn filename_timestamp(at: NaiveDateTime) -> String {
    at.format(FILENAME_TIMESTAMP_FORMAT).to_string()
}

pub fn parse_filename_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, FILENAME_TIMESTAMP_FORMAT).ok()
}

/// Compact mission duration: `0m`, `45s`, `12m`, `4h0m`, `2d3h4m`.
pub fn duration_string(seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    match secs {
        0 => "0m".to_string(),
        1..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86399 => format!("{}h{}m", secs / 3600, (secs / 60) % 60),
        _ => format!(
            "{}d{}h{}m",
            secs / 86400,
            (secs / 3600) % 24,
            (secs / 60) % 60
        ),
    }
}

/// Relative age such as `3 hours ago`. Future times are clamped to now.
pub fn humanize_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let (value, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3599 => (secs / 60, "minute"),
        3600..=86399 => (secs / 3600, "hour"),
        86400..=2_591_999 => (secs / 86400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };
    if value == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{value} {unit}s ago")
    }
}
