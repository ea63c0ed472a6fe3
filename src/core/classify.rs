//! Value classification for storage routing.
//!
//! Native numbers are numeric. Text is numeric only if it consists of
//! ASCII digits with at most one decimal point: there is no sign, exponent
//! or whitespace handling, so `"-5"` and `"1e3"` are stored as text.

use crate::core::data::RawValue;

/// Result of classifying a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Whether the value is routed to the numeric column.
    pub is_numeric: bool,
}

/// Classify a raw value as numeric or textual.
pub fn classify(raw: &RawValue) -> Classification {
    let is_numeric = match raw {
        RawValue::Text(s) => is_numeric_text(s),
        _ => true,
    };
    Classification { is_numeric }
}

/// Check whether text is digits with at most one decimal point.
pub fn is_numeric_text(s: &str) -> bool {
    let mut digits = 0usize;
    let mut points = 0usize;

    for ch in s.chars() {
        match ch {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return false,
        }
    }

    digits > 0 && points <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_values_are_numeric() {
        assert!(classify(&RawValue::Integer(-7)).is_numeric);
        assert!(classify(&RawValue::Float(f64::NAN)).is_numeric);
        assert!(classify(&RawValue::Bit(true)).is_numeric);
    }

    #[test]
    fn test_digit_strings_are_numeric() {
        for s in ["0", "42", "3.14", "5.", ".5", "007"] {
            assert!(is_numeric_text(s), "{s} should be numeric");
        }
    }

    #[test]
    fn test_narrow_rule_rejects_signs_and_exponents() {
        for s in ["-5", "+1", "1e3", "RUN", " 5", "1.2.3", ".", "", "1,000", "٣"] {
            assert!(!is_numeric_text(s), "{s:?} should not be numeric");
        }
    }

    #[test]
    fn test_classify_text() {
        assert!(classify(&RawValue::from("42")).is_numeric);
        assert!(!classify(&RawValue::from("RUN")).is_numeric);
    }
}
