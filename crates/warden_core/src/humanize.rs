//! Human-readable duration rendering for user feedback.

use std::time::Duration;

/// Render a duration the way feedback messages present remaining time.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use warden_core::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(10)), "10 seconds");
/// assert_eq!(format_duration(Duration::from_secs(3600)), "1 hours, 0 minutes and 0 seconds");
/// ```
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    if d < Duration::from_secs(1) {
        return format!("{} milliseconds", d.as_millis());
    }
    if total < 60 {
        return format!("{} seconds", total);
    }
    let seconds = total % 60;
    let minutes = (total / 60) % 60;
    if total < 3600 {
        return format!("{} minutes and {} seconds", total / 60, seconds);
    }
    let hours = (total / 3600) % 24;
    if total < 86_400 {
        return format!(
            "{} hours, {} minutes and {} seconds",
            total / 3600,
            minutes,
            seconds
        );
    }
    format!(
        "{} days, {} hours, {} minutes and {} seconds",
        total / 86_400,
        hours,
        minutes,
        seconds
    )
}
