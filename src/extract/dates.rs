//! Relative posting dates
//!
//! Job boards print posting times relative to now: `3d ago`, `5h ago`,
//! `about 4 hours ago`, `2 days ago`, `30+ days ago`, `less than an hour
//! ago`, `Just posted`. These are turned into an age and an absolute
//! timestamp.

use crate::storage::TIMESTAMP_FORMAT;
use chrono::{DateTime, Duration, Utc};

/// Days counted for one month
const DAYS_PER_MONTH: i64 = 30;

/// Parses a relative posting time into the listing's age
///
/// Returns `None` for text in an unknown format.
pub fn parse_relative_age(text: &str) -> Option<Duration> {
    let lower = text.trim().to_lowercase();
    let tokens: Vec<&str> = lower
        .split_whitespace()
        .filter(|t| !matches!(*t, "about" | "over" | "almost" | "ago" | "posted"))
        .collect();

    let first = *tokens.first()?;
    match first {
        "just" | "today" | "now" => return Some(Duration::zero()),
        "yesterday" => return Some(Duration::days(1)),
        "less" => return Some(Duration::minutes(1)),
        _ => {}
    }

    if tokens.len() == 1 {
        return parse_compact(first);
    }

    let amount = match first {
        "a" | "an" | "one" => 1,
        n => n.trim_end_matches('+').parse::<i64>().ok()?,
    };
    unit_duration(tokens[1], amount)
}

/// Parses the short form used by some boards, e.g. `3d` or `45m`
fn parse_compact(token: &str) -> Option<Duration> {
    let split = token.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = token.split_at(split);
    let amount = digits.parse::<i64>().ok()?;
    unit_duration(unit.trim_end_matches('+'), amount)
}

fn unit_duration(unit: &str, amount: i64) -> Option<Duration> {
    let duration = match unit {
        "s" | "sec" | "second" | "seconds" => Duration::seconds(amount),
        "m" | "min" | "minute" | "minutes" => Duration::minutes(amount),
        "h" | "hr" | "hour" | "hours" => Duration::hours(amount),
        "d" | "day" | "days" => Duration::days(amount),
        "w" | "week" | "weeks" => Duration::weeks(amount),
        "mo" | "month" | "months" => Duration::days(amount * DAYS_PER_MONTH),
        _ => return None,
    };
    Some(duration)
}

/// True when a listing of this age is inside the day window
pub fn within_day_limit(age: Duration, day_limit: u32) -> bool {
    age.num_days() <= i64::from(day_limit)
}

/// Absolute posting time for a listing of this age, relative to `now`
pub fn posted_at(now: DateTime<Utc>, age: Duration) -> String {
    (now - age).format(TIMESTAMP_FORMAT).to_string()
}
