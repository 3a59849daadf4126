//! Wall-clock helpers. Every persisted timestamp is Unix seconds (UTC).

use chrono::{DateTime, Utc};

/// Current time as Unix seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Start of the UTC calendar day containing `timestamp`.
///
/// "Today" in every analytics query means `started_at >= start_of_day(now())`.
pub fn start_of_day(timestamp: i64) -> i64 {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .and_then(|dt| dt.date_naive().and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or(timestamp - timestamp.rem_euclid(86_400))
}
