//! Lightweight cron expression parser for the fixed system jobs.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Minute/hour: *, */N, N, a,b,c. Day/month/weekday fields: * only.
//! Example: "0 8,12,16,20 * * *" = four times a day.

use chrono::{DateTime, Duration, TimeZone, Timelike};

/// Whether `expression` is something [`next_run_from_cron`] can evaluate.
pub fn is_valid(expression: &str) -> bool {
    parse(expression).is_some()
}

/// Compute the next matching minute strictly after `after`, in `after`'s timezone.
pub fn next_run_from_cron<Tz: TimeZone>(expression: &str, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let Some((minutes, hours)) = parse(expression) else {
        tracing::warn!(
            "Invalid cron expression: '{}' (need 5 fields: MIN HOUR * * *)",
            expression
        );
        return None;
    };

    let mut candidate = after + Duration::minutes(1);
    // Zero out seconds
    candidate = candidate
        .with_second(0)
        .and_then(|c| c.with_nanosecond(0))
        .unwrap_or(candidate);

    // Day-level fields are wildcards, so 48 hours always contains a match
    for _ in 0..(48 * 60) {
        if minutes.contains(&candidate.minute()) && hours.contains(&candidate.hour()) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }

    None
}

fn parse(expression: &str) -> Option<(Vec<u32>, Vec<u32>)> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 || parts[2..].iter().any(|p| *p != "*") {
        return None;
    }
    let minutes = parse_field(parts[0], 0, 59)?;
    let hours = parse_field(parts[1], 0, 23)?;
    Some((minutes, hours))
}

/// Parse a cron field into a list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N: every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    // Comma-separated: "8,12,16,20"
    if field.contains(',') {
        let vals: Result<Vec<u32>, _> = field.split(',').map(|s| s.trim().parse()).collect();
        let vals: Vec<u32> = vals.ok()?.into_iter().filter(|x| *x >= min && *x <= max).collect();
        return if vals.is_empty() { None } else { Some(vals) };
    }

    // Single number
    let n: u32 = field.parse().ok()?;
    if n >= min && n <= max {
        Some(vec![n])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_daily_backup_time() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let next = next_run_from_cron("0 2 * * *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 23, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_four_times_daily() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap();
        let next = next_run_from_cron("0 8,12,16,20 * * *", after).unwrap();
        assert_eq!(next.hour(), 16);
        assert_eq!(next.minute(), 0);

        let late = Utc.with_ymd_and_hms(2026, 2, 22, 20, 15, 42).unwrap();
        let next = next_run_from_cron("0 8,12,16,20 * * *", late).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 23, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_every_15_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 0).unwrap();
        let next = next_run_from_cron("*/15 * * * *", after).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_invalid_expression() {
        let after = Utc::now();
        assert!(next_run_from_cron("bad", after).is_none());
        assert!(next_run_from_cron("0 2 1 * *", after).is_none());
        assert!(next_run_from_cron("0 25 * * *", after).is_none());
        assert!(!is_valid("61 * * * *"));
        assert!(is_valid("0 2 * * *"));
    }
}
