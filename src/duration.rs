//! Human-friendly durations for command-line flags.

use std::time::Duration;

use anyhow::{bail, Result};

/// Suffix to seconds multiplier (longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ms", 0.001),
    ("s", 1.0),
    ("m", 60.0),
    ("h", 3_600.0),
];

/// Parse strings like "500ms", "30s", "2m" or "1.5h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| s.strip_suffix(suffix).map(|n| (n, *multiplier)))
        .unwrap_or((s, 1.0));

    let val: f64 = match number.trim().parse() {
        Ok(val) => val,
        Err(_) => bail!("Unknown duration format: {}", s),
    };
    match Duration::try_from_secs_f64(val * multiplier) {
        Ok(d) => Ok(d),
        Err(_) => bail!("Duration out of range: {}", s),
    }
}
