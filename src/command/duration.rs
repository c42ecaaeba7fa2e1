//! Parses the duration literals accepted by `storex` (`"1s"`, `"500ms"`).
//! Self-contained: the grammar is two tokens wide and not worth a crate.

use crate::error::{DbError, Result};

/// Parses a literal like `"500ms"` or `"1s"` into whole seconds, rounding
/// any sub-second remainder up. Sub-second precision is not available at
/// the storage layer (`Entry::expiration` is second-granular), so this is
/// where that rounding happens.
pub fn parse_lifetime_secs(literal: &str) -> Result<u64> {
    let split_at = literal
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| DbError::InvalidArgument(format!("missing unit in lifetime: {literal}")))?;

    let (number, unit) = literal.split_at(split_at);
    let number: u64 = number
        .parse()
        .map_err(|_| DbError::InvalidArgument(format!("invalid lifetime: {literal}")))?;

    let nanos_per_unit: u128 = match unit {
        "ns" => 1,
        "us" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        other => {
            return Err(DbError::InvalidArgument(format!(
                "unknown lifetime unit: {other}"
            )))
        }
    };

    let total_nanos = number as u128 * nanos_per_unit;
    let whole_seconds = total_nanos / 1_000_000_000;
    let remainder = total_nanos % 1_000_000_000;

    let secs = if remainder > 0 { whole_seconds + 1 } else { whole_seconds };
    if secs == 0 {
        return Err(DbError::InvalidArgument(
            "lifetime must be greater than zero".to_string(),
        ));
    }

    Ok(secs as u64)
}

/// Canonical textual form of a whole-second lifetime, used when building a
/// command's relay text. Always emitted in seconds regardless of the unit
/// the client originally used.
pub fn format_lifetime_secs(secs: u64) -> String {
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_seconds() {
        assert_eq!(parse_lifetime_secs("1s").unwrap(), 1);
        assert_eq!(parse_lifetime_secs("30s").unwrap(), 30);
    }

    #[test]
    fn rounds_sub_second_literals_up() {
        assert_eq!(parse_lifetime_secs("500ms").unwrap(), 1);
        assert_eq!(parse_lifetime_secs("1500ms").unwrap(), 2);
        assert_eq!(parse_lifetime_secs("1ns").unwrap(), 1);
    }

    #[test]
    fn minutes_and_hours_convert_to_seconds() {
        assert_eq!(parse_lifetime_secs("2m").unwrap(), 120);
        assert_eq!(parse_lifetime_secs("1h").unwrap(), 3600);
    }

    #[test]
    fn zero_lifetime_is_rejected() {
        assert!(parse_lifetime_secs("0s").is_err());
    }

    #[test]
    fn unknown_unit_is_rejected() {
        assert!(parse_lifetime_secs("5x").is_err());
    }

    #[test]
    fn missing_unit_is_rejected() {
        assert!(parse_lifetime_secs("500").is_err());
    }
}
