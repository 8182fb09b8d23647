//! Feed presentation helpers
//!
//! Featured post sampling and timestamp formatting.

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Pick up to `count` distinct items at random
///
/// The same seed over the same items always yields the same sample.
pub fn sample_featured<T: Clone>(items: &[T], count: usize, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    items.choose_multiple(&mut rng, count).cloned().collect()
}

/// e.g. "Jan 5, 2024 at 3:07 PM"
pub fn format_date_time(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%b %-d, %Y at %-I:%M %p").to_string()
}

fn ago(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

/// Age of `timestamp` relative to `now`
///
/// Thirty days or older shows the full date.
pub fn relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - timestamp;

    if elapsed >= Duration::days(30) {
        format_date_time(timestamp)
    } else if elapsed.num_days() >= 1 {
        ago(elapsed.num_days(), "day")
    } else if elapsed.num_hours() >= 1 {
        ago(elapsed.num_hours(), "hour")
    } else if elapsed.num_minutes() >= 1 {
        ago(elapsed.num_minutes(), "minute")
    } else {
        "just now".to_string()
    }
}
