//! Type coercion functions for raw source values.
//!
//! Every coercion is total over the union of "empty/missing" and
//! "well-formed" inputs: malformed values map to null (or false for
//! booleans), they never raise. Numeric parsing handles the Norwegian
//! locale where the decimal separator is a comma.

use serde_json::{Number, Value, json};

/// Case-insensitive truthy tokens, including the Norwegian affirmative.
const TRUTHY: &[&str] = &["true", "1", "yes", "ja"];

/// Coercion applied to a source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coerce {
    /// Pass the value through, trimming surrounding whitespace on strings.
    Text,
    /// Locale-aware float ("38,5" parses as 38.5).
    Float,
    /// Like `Float`, but an empty or unparseable value becomes 0.
    FloatOrZero,
    /// Float with the percentage convention: values above 1 are
    /// divided by 100 (the source stores "45" for 45%).
    Percent,
    /// Integer.
    Int,
    /// Integer where the literal zero means "unknown" and maps to null.
    /// Used for cadastre identifiers sourced from government registries.
    IntZeroAbsent,
    /// Truthy-token boolean; anything unrecognized is false.
    Bool,
    /// ISO-8601 timestamp normalized to a canonical instant.
    Timestamp,
    /// Comma-separated text split into a list of trimmed items.
    TextList,
    /// A constant column value, independent of the source record.
    Const(&'static str),
}

/// Apply a coercion to a raw value. `None` means the source field was
/// absent from the record.
pub fn apply(raw: Option<&Value>, coerce: Coerce) -> Value {
    if let Coerce::Const(s) = coerce {
        return json!(s);
    }

    let Some(raw) = raw else {
        return match coerce {
            Coerce::Bool => Value::Bool(false),
            Coerce::FloatOrZero => json!(0.0),
            Coerce::TextList => Value::Array(Vec::new()),
            _ => Value::Null,
        };
    };

    match coerce {
        Coerce::Text => match raw {
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other.clone(),
        },
        Coerce::Float => float_value(raw, false).map_or(Value::Null, num),
        Coerce::FloatOrZero => num(float_value(raw, false).unwrap_or(0.0)),
        Coerce::Percent => float_value(raw, true).map_or(Value::Null, num),
        Coerce::Int => int_value(raw, false).map_or(Value::Null, |n| json!(n)),
        Coerce::IntZeroAbsent => int_value(raw, true).map_or(Value::Null, |n| json!(n)),
        Coerce::Bool => Value::Bool(bool_value(raw)),
        Coerce::Timestamp => match raw {
            Value::String(s) => parse_timestamp(s).map_or(Value::Null, Value::String),
            _ => Value::Null,
        },
        Coerce::TextList => match raw {
            Value::String(s) => Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| json!(v))
                    .collect(),
            ),
            _ => Value::Array(Vec::new()),
        },
        Coerce::Const(_) => unreachable!("handled above"),
    }
}

fn num(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn float_value(raw: &Value, divide_by_100: bool) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64().map(|v| scale(v, divide_by_100)),
        Value::String(s) => parse_float(s, divide_by_100),
        _ => None,
    }
}

fn int_value(raw: &Value, zero_absent: bool) -> Option<i64> {
    match raw {
        Value::Number(n) => {
            let v = n.as_i64()?;
            if zero_absent && v == 0 { None } else { Some(v) }
        }
        Value::String(s) => parse_int(s, zero_absent),
        _ => None,
    }
}

fn bool_value(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::String(s) => parse_bool(s),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Parse a float from a string, accepting a comma decimal separator.
/// Empty and unparseable inputs return `None`.
pub fn parse_float(value: &str, divide_by_100: bool) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let cleaned = value.replace(',', ".");
    cleaned.parse::<f64>().ok().map(|v| scale(v, divide_by_100))
}

fn scale(value: f64, divide_by_100: bool) -> f64 {
    if divide_by_100 && value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

/// Parse an integer from a string. With `zero_absent` the literal "0"
/// maps to `None` (the source convention for unknown identifiers).
pub fn parse_int(value: &str, zero_absent: bool) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() || (zero_absent && value == "0") {
        return None;
    }
    value.parse::<i64>().ok()
}

/// Parse a boolean from a string against the truthy token set.
pub fn parse_bool(value: &str) -> bool {
    TRUTHY.contains(&value.trim().to_lowercase().as_str())
}

/// Parse and normalize a timestamp string.
///
/// ISO-8601 date-times (optionally with a 'Z' suffix and sub-second
/// fraction) normalize to a canonical UTC instant. Bare dates the
/// destination accepts pass through unchanged. Anything else is `None`.
pub fn parse_timestamp(value: &str) -> Option<String> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};

    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.to_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        // Timezone-less form, e.g. "2024-03-01T12:30:00.123"
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
        return None;
    }

    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        return Some(value.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_comma_decimal() {
        assert_eq!(parse_float("38,5", false), Some(38.5));
        assert_eq!(parse_float("45.2", false), Some(45.2));
        assert_eq!(parse_float(" 12,0 ", false), Some(12.0));
    }

    #[test]
    fn test_parse_float_never_raises() {
        assert_eq!(parse_float("", false), None);
        assert_eq!(parse_float("abc", false), None);
        assert_eq!(parse_float("12,3,4", false), None);
    }

    #[test]
    fn test_parse_float_percent_scaling() {
        // Integer percentages above 1 are scaled down
        assert_eq!(parse_float("45", true), Some(0.45));
        assert_eq!(parse_float("0,8", true), Some(0.8));
        assert_eq!(parse_float("1", true), Some(1.0));
    }

    #[test]
    fn test_parse_int_zero_absent() {
        assert_eq!(parse_int("0", true), None);
        assert_eq!(parse_int("42", true), Some(42));
        assert_eq!(parse_int("0", false), Some(0));
        assert_eq!(parse_int("", true), None);
        assert_eq!(parse_int("x", false), None);
    }

    #[test]
    fn test_parse_bool_tokens() {
        assert!(parse_bool("true"));
        assert!(parse_bool("True"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("Ja"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("nei"));
        assert!(!parse_bool(""));
        assert!(!parse_bool("2"));
    }

    #[test]
    fn test_parse_timestamp_normalization() {
        assert_eq!(
            parse_timestamp("2024-03-01T12:30:00Z"),
            Some("2024-03-01T12:30:00Z".to_string())
        );
        assert_eq!(
            parse_timestamp("2024-03-01T12:30:00.123456Z"),
            Some("2024-03-01T12:30:00Z".to_string())
        );
        assert_eq!(
            parse_timestamp("2024-03-01T13:30:00+01:00"),
            Some("2024-03-01T12:30:00Z".to_string())
        );
        assert_eq!(
            parse_timestamp("2024-03-01T12:30:00"),
            Some("2024-03-01T12:30:00".to_string())
        );
    }

    #[test]
    fn test_parse_timestamp_passthrough_and_null() {
        // Bare dates pass through unchanged
        assert_eq!(
            parse_timestamp("2024-03-01"),
            Some("2024-03-01".to_string())
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("01.03.2024"), None);
    }

    #[test]
    fn test_apply_missing_field_defaults() {
        assert_eq!(apply(None, Coerce::Bool), Value::Bool(false));
        assert_eq!(apply(None, Coerce::FloatOrZero), serde_json::json!(0.0));
        assert_eq!(apply(None, Coerce::Float), Value::Null);
        assert_eq!(apply(None, Coerce::TextList), Value::Array(Vec::new()));
    }

    #[test]
    fn test_apply_typed_values() {
        // Notion sources produce native numbers/booleans, not strings
        assert_eq!(apply(Some(&serde_json::json!(38.5)), Coerce::Float), serde_json::json!(38.5));
        assert_eq!(apply(Some(&serde_json::json!(true)), Coerce::Bool), Value::Bool(true));
        assert_eq!(apply(Some(&serde_json::json!(0)), Coerce::IntZeroAbsent), Value::Null);
        assert_eq!(apply(Some(&serde_json::json!(7)), Coerce::IntZeroAbsent), serde_json::json!(7));
    }

    #[test]
    fn test_apply_text_list() {
        let raw = serde_json::json!("height, width , depth,");
        assert_eq!(
            apply(Some(&raw), Coerce::TextList),
            serde_json::json!(["height", "width", "depth"])
        );
    }
}
