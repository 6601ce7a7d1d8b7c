//! Duration strings in the metrics engine's syntax (`30s`, `5m`, `1h30m`)

use crate::error::{CostvalError, Result};
use chrono::Duration;

/// Units accepted by the engine, in milliseconds. `ms` must precede `m`.
const UNITS: &[(&str, i64)] = &[
    ("ms", 1),
    ("s", 1_000),
    ("m", 60_000),
    ("h", 3_600_000),
    ("d", 86_400_000),
    ("w", 604_800_000),
    ("y", 31_536_000_000),
];

/// Parse a duration such as `5m`, `24h` or `1h30m`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = |reason: &str| CostvalError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if input.is_empty() {
        return Err(invalid("empty duration"));
    }

    let mut total_ms: i64 = 0;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err(invalid("expected a number"));
        }
        let amount: i64 = rest[..digits]
            .parse()
            .map_err(|_| invalid("number out of range"))?;
        rest = &rest[digits..];

        let (suffix, unit_ms) = UNITS
            .iter()
            .find(|(suffix, _)| rest.starts_with(suffix))
            .ok_or_else(|| invalid("unknown unit"))?;
        rest = &rest[suffix.len()..];

        total_ms = amount
            .checked_mul(*unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| invalid("duration out of range"))?;
    }

    Ok(Duration::milliseconds(total_ms))
}

/// Render a duration in the largest unit that divides it exactly
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.num_milliseconds();
    if ms == 0 {
        return "0s".to_string();
    }
    if ms < 0 {
        return format!("-{}", format_duration(Duration::milliseconds(-ms)));
    }

    UNITS
        .iter()
        .rev()
        .find(|(_, unit_ms)| ms % unit_ms == 0)
        .map(|(suffix, unit_ms)| format!("{}{}", ms / unit_ms, suffix))
        .unwrap_or_else(|| format!("{ms}ms"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_duration("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_duration("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_duration("1w").unwrap(), Duration::weeks(1));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::minutes(90)
        );
        assert_eq!(
            parse_duration("1m500ms").unwrap(),
            Duration::milliseconds(60_500)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("m5").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("-5m").is_err());
    }

    #[test]
    fn test_format_picks_largest_exact_unit() {
        assert_eq!(format_duration(Duration::hours(24)), "1d");
        assert_eq!(format_duration(Duration::minutes(90)), "90m");
        assert_eq!(format_duration(Duration::seconds(45)), "45s");
        assert_eq!(format_duration(Duration::milliseconds(1500)), "1500ms");
        assert_eq!(format_duration(Duration::zero()), "0s");
    }

    #[test]
    fn test_format_then_parse_is_stable() {
        for text in ["5m", "1d", "2w", "90s"] {
            let parsed = parse_duration(text).unwrap();
            assert_eq!(format_duration(parsed), text);
        }
    }
}
