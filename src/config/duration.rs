//! Duration parsing utilities.

use anyhow::Context;
use std::time::Duration;

/// Units accepted after the number, in matching order ("ms" must come
/// before "m" and "s").
const UNITS: &[(&str, u64)] = &[("ms", 1), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)];

/// Parse a duration string like "1h", "30m", "300s", "500ms" or "300".
///
/// A number without a unit is read as seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (digits, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, millis)| s.strip_suffix(suffix).map(|n| (n, *millis)))
        .unwrap_or((s, 1_000));

    let value: u64 = digits
        .parse()
        .with_context(|| format!("Invalid duration value: {s}"))?;
    let millis = value
        .checked_mul(millis_per_unit)
        .with_context(|| format!("Duration out of range: {s}"))?;
    Ok(Duration::from_millis(millis))
}
