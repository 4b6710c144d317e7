//! Formatting helpers for text reports.

use chrono::{DateTime, Utc};

/// Format a money amount with thousands separators and two decimals
/// (e.g., "1,500,000.00", "-12.50").
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac)
}

/// Format a percentage with one decimal (e.g., "50.0%").
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format a change percentage with an explicit sign (e.g., "+23%" or "-15%").
pub fn format_delta(delta: f64) -> String {
    if delta >= 0.0 {
        format!("+{:.0}%", delta)
    } else {
        format!("{:.0}%", delta)
    }
}

/// Format a timestamp relative to `now` (e.g., "3d ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 60 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}

/// Show an optional field, or "-" if missing.
pub fn format_optional(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
