//! Human-readable countdowns for the history table.

use chrono::{DateTime, Utc};

use crate::domain::email::Remaining;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 730 * HOUR;

/// Formats hours-remaining as a single unit pair, e.g. `2h 15m`.
///
/// The input is rounded to whole seconds first; each unit is then rounded
/// down. Anything at or below zero is `Expired`.
pub fn format_time_left(hours: f64) -> String {
    if !hours.is_finite() {
        return if hours > 0.0 { "Never".into() } else { "Expired".into() };
    }
    let total = (hours * HOUR as f64).round() as i64;
    if total <= 0 {
        return "Expired".into();
    }

    if total < MINUTE {
        format!("{total}s")
    } else if total < HOUR {
        format!("{}m {}s", total / MINUTE, total % MINUTE)
    } else if total < DAY {
        format!("{}h {}m", total / HOUR, (total % HOUR) / MINUTE)
    } else if total < MONTH {
        format!("{}d {}h", total / DAY, (total % DAY) / HOUR)
    } else {
        format!("{}mo {}w", total / MONTH, (total % MONTH) / WEEK)
    }
}

pub fn format_remaining(remaining: Remaining) -> String {
    match remaining.as_hours() {
        None => "Never".into(),
        Some(h) => format_time_left(h),
    }
}

/// Formats an epoch timestamp as `YYYY-MM-DD HH:MM` (UTC).
pub fn format_epoch(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into())
}

/// Formats a byte count for attachment listings.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
