//! Human-readable rendering of byte counts and timestamps.

use chrono::{NaiveDateTime, Utc};

/// Render a byte count using binary units, truncating toward zero.
///
/// Values below 1024 are shown in bytes, below 1024^2 in whole KB,
/// below 1024^3 in whole MB, and everything else in whole GB. The
/// truncation (never rounding) is intentional: 2097153 bytes is "2MB",
/// not "2.0MB" or "3MB".
pub fn naturalsize(count: u64) -> String {
    const K: u64 = 1024;
    const M: u64 = K * K;
    const G: u64 = K * M;

    if count < K {
        format!("{}B", count)
    } else if count < M {
        format!("{}KB", count / K)
    } else if count < G {
        format!("{}MB", count / M)
    } else {
        format!("{}GB", count / G)
    }
}

/// Render a SQLite `datetime('now')` timestamp as a rough relative time,
/// e.g. "4 minutes ago". Unparseable input is returned as-is.
pub fn naturaltime(timestamp: &str) -> String {
    let Ok(parsed) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S") else {
        return timestamp.to_string();
    };

    let seconds = (Utc::now().naive_utc() - parsed).num_seconds().max(0);
    match seconds {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(seconds / 60, "minute"),
        3600..=86_399 => plural(seconds / 3600, "hour"),
        _ => plural(seconds / 86_400, "day"),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}
