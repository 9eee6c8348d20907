//! Frequency resolver: symbolic frequency → next fire instant.

use chrono::{DateTime, Utc};
use crawlwatch_core::error::Result;
use crawlwatch_core::types::Frequency;

/// Next fire time, measured from `from` (normally the completion instant of
/// the previous run, so a late run never causes back-to-back re-fires).
pub fn next_fire_time(frequency: Frequency, from: DateTime<Utc>) -> DateTime<Utc> {
    from + frequency.interval()
}

/// Parse admin input. Unknown values are rejected here, at task-create time,
/// and never reach the engine.
pub fn parse_frequency(input: &str) -> Result<Frequency> {
    input.parse()
}
