//! Fixed integer multipliers for numeric unit suffixes (spec §4.1). Applied
//! at lex time, so the parser and everything downstream only ever sees a
//! plain `Number` literal.

/// Returns the multiplier for a recognized unit suffix, or `None` if
/// `suffix` is not one of the known byte/bit/time units.
pub fn unit_multiplier(suffix: &str) -> Option<i64> {
    let lower = suffix.to_ascii_lowercase();
    Some(match lower.as_str() {
        // Bytes
        "byte" | "bytes" => 1,
        "kbyte" | "kbytes" => 1_024,
        "mbyte" | "mbytes" => 1_024 * 1_024,
        "gbyte" | "gbytes" => 1_024 * 1_024 * 1_024,
        "tbyte" | "tbytes" => 1_024 * 1_024 * 1_024 * 1_024,
        // Bits
        "bit" | "bits" => 1,
        "kbit" | "kbits" => 1_000,
        "mbit" | "mbits" => 1_000_000,
        "gbit" | "gbits" => 1_000_000_000,
        "tbit" | "tbits" => 1_000_000_000_000,
        // Time, expressed in seconds
        "sec" | "secs" | "second" | "seconds" => 1,
        "min" | "mins" | "minute" | "minutes" => 60,
        "hour" | "hours" => 60 * 60,
        "day" | "days" => 60 * 60 * 24,
        "week" | "weeks" => 60 * 60 * 24 * 7,
        "month" | "months" => 60 * 60 * 24 * 30,
        "year" | "years" => 60 * 60 * 24 * 365,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_units_are_binary() {
        assert_eq!(unit_multiplier("kbyte"), Some(1_024));
        assert_eq!(unit_multiplier("mbyte"), Some(1_024 * 1_024));
    }

    #[test]
    fn bit_units_are_decimal() {
        assert_eq!(unit_multiplier("kbit"), Some(1_000));
    }

    #[test]
    fn time_units_resolve_to_seconds() {
        assert_eq!(unit_multiplier("min"), Some(60));
        assert_eq!(unit_multiplier("day"), Some(86_400));
    }

    #[test]
    fn unknown_suffix_is_none() {
        assert_eq!(unit_multiplier("furlong"), None);
    }
}
