//! Human-readable durations ("15m", "1h30m", "500ms") for config files and CLI flags.

use std::time::Duration;

use anyhow::{bail, Context, Result};

const UNITS: &[(&str, u64)] = &[
    ("ms", 1),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
];

/// Parse a duration made of one or more `<number><unit>` segments.
///
/// Units: `d`, `h`, `m`, `s`, `ms`. Segments may be combined (`1h30m`).
/// Input is case-insensitive and surrounding whitespace is ignored.
///
/// ```
/// use ratekeep::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(15 * 60));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(90 * 60));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim().to_lowercase();
    if s.is_empty() {
        bail!("Duration is empty");
    }

    let mut rest = s.as_str();
    let mut total_ms: u64 = 0;

    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            bail!("Expected a number in duration '{input}'");
        }
        let (num, tail) = rest.split_at(digits);
        let num: u64 = num
            .parse()
            .with_context(|| format!("Invalid number in duration '{input}'"))?;

        let Some((unit, factor)) = UNITS.iter().find(|(unit, _)| tail.starts_with(unit)) else {
            bail!("Duration '{input}' must use units d, h, m, s or ms");
        };

        let segment = num
            .checked_mul(*factor)
            .context("Duration is too large")?;
        total_ms = total_ms
            .checked_add(segment)
            .context("Duration is too large")?;
        rest = &tail[unit.len()..];
    }

    Ok(Duration::from_millis(total_ms))
}

/// Whole days as a `Duration`, rejecting counts that overflow.
pub fn from_days(days: u64) -> Result<Duration> {
    let secs = days
        .checked_mul(24 * 60 * 60)
        .with_context(|| format!("{days} days is too large"))?;
    Ok(Duration::from_secs(secs))
}

/// Format a duration compactly, largest unit first (`5400s` → `1h30m`).
///
/// ```
/// use ratekeep::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(15 * 60)), "15m");
/// assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
/// assert_eq!(format_duration(Duration::ZERO), "0s");
/// ```
pub fn format_duration(d: Duration) -> String {
    let mut remaining = d.as_millis().min(u128::from(u64::MAX)) as u64;
    if remaining == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, factor) in [
        ("d", 24 * 60 * 60 * 1000),
        ("h", 60 * 60 * 1000),
        ("m", 60 * 1000),
        ("s", 1000),
        ("ms", 1),
    ] {
        let count = remaining / factor;
        if count > 0 {
            out.push_str(&format!("{count}{unit}"));
            remaining -= count * factor;
        }
    }
    out
}

/// Serde adapter storing a [`Duration`] as a human string.
///
/// Use with `#[serde(with = "crate::duration::human")]`.
pub mod human {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(de::Error::custom)
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(2 * 86400));
        assert_eq!(parse_duration("3h").unwrap(), Duration::from_secs(3 * 3600));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("750ms").unwrap(), Duration::from_millis(750));
    }

    #[test]
    fn minutes_are_not_confused_with_milliseconds() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("5ms").unwrap(), Duration::from_millis(5));
    }

    #[test]
    fn parses_compound_segments() {
        assert_eq!(
            parse_duration("1d12h").unwrap(),
            Duration::from_secs(36 * 3600)
        );
        assert_eq!(
            parse_duration(" 1M30S ").unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("99999999999999999999d").is_err());
    }

    #[test]
    fn from_days_rejects_overflow() {
        assert_eq!(from_days(30).unwrap(), Duration::from_secs(30 * 86400));
        assert!(from_days(u64::MAX).is_err());
        assert!(from_days(u64::MAX / 86400 + 1).is_err());
    }

    #[test]
    fn format_then_parse_keeps_value() {
        for d in [
            Duration::from_secs(1),
            Duration::from_secs(5400),
            Duration::from_millis(1500),
            Duration::from_secs(30 * 86400),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }

    #[test]
    fn human_serde_adapter_reads_toml_strings() {
        #[derive(serde::Deserialize, serde::Serialize)]
        struct Wrapper {
            #[serde(with = "human")]
            every: Duration,
        }

        let parsed: Wrapper = toml::from_str(r#"every = "1h15m""#).unwrap();
        assert_eq!(parsed.every, Duration::from_secs(75 * 60));
        assert_eq!(toml::to_string(&parsed).unwrap().trim(), r#"every = "1h15m""#);
    }
}
