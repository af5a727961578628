//! Short relative date bucketing
//!
//! Maps a timestamp to the coarse day label used to group a chat timeline
//! into sections: "today" for the current calendar day, the weekday name
//! within the last six days, month and day within the current year, and
//! the full date beyond that. `now` is passed explicitly so bucketing is
//! deterministic under test.

use chrono::{DateTime, Datelike, Local, Utc};

/// Convert epoch seconds to a local-time datetime
pub fn local_datetime(timestamp: f64) -> DateTime<Local> {
    let secs = timestamp.floor() as i64;
    let nanos = ((timestamp - secs as f64) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .with_timezone(&Local)
}

/// The day bucket of `timestamp` relative to `now`
///
/// # Examples
///
/// ```
/// use chrono::Local;
/// use convosync::timeline::short_relative_date;
///
/// let now = Local::now();
/// let bucket = short_relative_date(now.timestamp() as f64, now);
/// assert_eq!(bucket, "today");
/// ```
pub fn short_relative_date(timestamp: f64, now: DateTime<Local>) -> String {
    let datetime = local_datetime(timestamp);
    let date = datetime.date_naive();
    let today = now.date_naive();

    if date.year() != today.year() {
        return datetime.format("%-m/%-d/%Y").to_string();
    }
    if (today - date).num_days() >= 7 {
        return datetime.format("%b %-d").to_string();
    }
    if date != today {
        return datetime.format("%a %-d").to_string();
    }
    "today".to_string()
}
