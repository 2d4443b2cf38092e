//! Cell coercion into contracted semantic types.
//!
//! Coercion never drops a value: blank cells become [`Missing::Absent`] and
//! anything that cannot be read as the contracted type becomes
//! [`Missing::Invalid`] carrying the original text.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{Missing, SemanticType, Value};
use crate::pipeline::schema::CoercionHint;

static NUMERIC_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]").unwrap());
static EPOCH_MILLIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{11,}$").unwrap());

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Coerce one cell. Values already missing pass through untouched.
pub fn coerce(value: &Value, kind: SemanticType, hint: CoercionHint) -> Value {
    if let Value::Missing(_) = value {
        return value.clone();
    }
    if let Value::Text(s) = value {
        if s.trim().is_empty() {
            return Value::absent();
        }
    }

    match kind {
        SemanticType::Categorical => to_categorical(value, hint),
        SemanticType::Numeric => to_number(value, hint),
        SemanticType::Integer => to_integer(value, hint),
        SemanticType::Date => to_date(value),
        SemanticType::Identifier => to_identifier(value, hint),
        SemanticType::Flag => to_flag(value),
    }
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::Missing(Missing::Invalid(raw)) => raw.clone(),
        other => other.to_string(),
    }
}

fn to_categorical(value: &Value, hint: CoercionHint) -> Value {
    let text = raw_text(value);
    let text = text.trim();
    match hint {
        CoercionHint::TitleCase => Value::Text(title_case(text)),
        _ => Value::text(text),
    }
}

/// Capitalize the first letter of every alphabetic run and lowercase the rest
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// Parse a numeric cell: thousands separators and whitespace are ignored, a
/// trailing percent sign is accepted when the hint asks for it.
pub fn parse_number(raw: &str, hint: CoercionHint) -> Option<f64> {
    let mut cleaned = NUMERIC_NOISE.replace_all(raw.trim(), "").into_owned();
    let percent = matches!(hint, CoercionHint::StripPercent | CoercionHint::PercentAsFraction);
    if percent {
        if let Some(stripped) = cleaned.strip_suffix('%') {
            cleaned = stripped.to_string();
        }
    }
    let n: f64 = cleaned.parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    match hint {
        CoercionHint::PercentAsFraction => Some(n / 100.0),
        _ => Some(n),
    }
}

fn to_number(value: &Value, hint: CoercionHint) -> Value {
    match value {
        Value::Number(n) if n.is_finite() => Value::Number(*n),
        Value::Integer(i) => Value::Number(*i as f64),
        Value::Text(s) => match parse_number(s, hint) {
            Some(n) => Value::Number(n),
            None => Value::invalid(s.trim()),
        },
        other => Value::invalid(raw_text(other)),
    }
}

fn integral(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

fn to_integer(value: &Value, hint: CoercionHint) -> Value {
    match value {
        Value::Integer(i) => Value::Integer(*i),
        Value::Number(n) => integral(*n).map(Value::Integer).unwrap_or_else(|| Value::invalid(n.to_string())),
        Value::Text(s) => match parse_number(s, hint).and_then(integral) {
            Some(i) => Value::Integer(i),
            None => Value::invalid(s.trim()),
        },
        other => Value::invalid(raw_text(other)),
    }
}

fn date_from_millis(ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

/// Parse the date forms seen across the source exports, including
/// GeoJSON epoch milliseconds.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Some(d);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if EPOCH_MILLIS.is_match(s) {
        return s.parse().ok().and_then(date_from_millis);
    }
    None
}

fn to_date(value: &Value) -> Value {
    match value {
        Value::Date(d) => Value::Date(*d),
        Value::Integer(ms) => date_from_millis(*ms).map(Value::Date).unwrap_or_else(|| Value::invalid(ms.to_string())),
        Value::Number(n) => integral(*n)
            .and_then(date_from_millis)
            .map(Value::Date)
            .unwrap_or_else(|| Value::invalid(n.to_string())),
        Value::Text(s) => parse_date(s).map(Value::Date).unwrap_or_else(|| Value::invalid(s.trim())),
        other => Value::invalid(raw_text(other)),
    }
}

fn to_identifier(value: &Value, hint: CoercionHint) -> Value {
    let numeric = match value {
        Value::Integer(i) => Some(*i),
        Value::Number(n) => integral(*n),
        Value::Text(s) => parse_number(s, CoercionHint::Plain).and_then(integral),
        _ => None,
    };
    match (hint, numeric) {
        (CoercionHint::ZeroPad(width), Some(i)) if i >= 0 => Value::Text(format!("{i:0width$}")),
        (CoercionHint::ZeroPad(_), _) => Value::invalid(raw_text(value).trim()),
        // "1234567890.0" from spreadsheet exports is still an identifier
        (_, Some(i)) if !matches!(value, Value::Text(s) if s.trim().starts_with('0')) => {
            Value::Text(i.to_string())
        }
        _ => Value::text(raw_text(value).trim()),
    }
}

fn to_flag(value: &Value) -> Value {
    match value {
        Value::Flag(b) => Value::Flag(*b),
        Value::Integer(0) => Value::Flag(false),
        Value::Integer(1) => Value::Flag(true),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Value::Flag(true),
            "false" | "no" | "n" | "0" => Value::Flag(false),
            _ => Value::invalid(s.trim()),
        },
        other => Value::invalid(raw_text(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::text(s)
    }

    #[test]
    fn numeric_strips_separators_and_flags_garbage() {
        let plain = CoercionHint::Plain;
        assert_eq!(coerce(&text(" 1,234.5 "), SemanticType::Numeric, plain), Value::Number(1234.5));
        assert_eq!(coerce(&text("n/a"), SemanticType::Numeric, plain), Value::invalid("n/a"));
        assert_eq!(coerce(&text("*"), SemanticType::Numeric, plain), Value::invalid("*"));
        assert_eq!(coerce(&text("NaN"), SemanticType::Numeric, plain), Value::invalid("NaN"));
        assert_eq!(coerce(&text("   "), SemanticType::Numeric, plain), Value::absent());
    }

    #[test]
    fn percent_hints() {
        assert_eq!(
            coerce(&text("45.2%"), SemanticType::Numeric, CoercionHint::StripPercent),
            Value::Number(45.2)
        );
        let Value::Number(n) = coerce(&text("5.2%"), SemanticType::Numeric, CoercionHint::PercentAsFraction) else {
            panic!("expected a number");
        };
        assert!((n - 0.052).abs() < 1e-12);
        // Numbers that already arrive typed are taken as they are
        assert_eq!(
            coerce(&Value::Number(0.1), SemanticType::Numeric, CoercionHint::PercentAsFraction),
            Value::Number(0.1)
        );
    }

    #[test]
    fn integers_accept_integral_floats_only() {
        let plain = CoercionHint::Plain;
        assert_eq!(coerce(&text("2023"), SemanticType::Integer, plain), Value::Integer(2023));
        assert_eq!(coerce(&text("12.0"), SemanticType::Integer, plain), Value::Integer(12));
        assert_eq!(coerce(&text("12.5"), SemanticType::Integer, plain), Value::invalid("12.5"));
    }

    #[test]
    fn dates_in_several_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        for raw in ["2024-06-30", "06/30/2024", "2024-06-30 00:00:00", "2024-06-30T08:15:00Z"] {
            assert_eq!(coerce(&text(raw), SemanticType::Date, CoercionHint::Plain), Value::Date(expected), "{raw}");
        }
        assert_eq!(
            coerce(&Value::Integer(1_719_705_600_000), SemanticType::Date, CoercionHint::Plain),
            Value::Date(expected)
        );
        assert!(coerce(&text("someday"), SemanticType::Date, CoercionHint::Plain).is_invalid());
    }

    #[test]
    fn identifiers_are_zero_padded() {
        assert_eq!(
            coerce(&text("5249.0"), SemanticType::Identifier, CoercionHint::ZeroPad(5)),
            text("05249")
        );
        assert_eq!(coerce(&Value::Integer(5), SemanticType::Identifier, CoercionHint::ZeroPad(2)), text("05"));
        assert!(coerce(&text("ABC"), SemanticType::Identifier, CoercionHint::ZeroPad(5)).is_invalid());
        assert_eq!(
            coerce(&text("1234567890.0"), SemanticType::Identifier, CoercionHint::Plain),
            text("1234567890")
        );
        assert_eq!(coerce(&text("0042"), SemanticType::Identifier, CoercionHint::Plain), text("0042"));
        assert_eq!(coerce(&text("4a"), SemanticType::Identifier, CoercionHint::Plain), text("4a"));
    }

    #[test]
    fn title_case_matches_county_spelling() {
        assert_eq!(title_case("SAN ANDREAS"), "San Andreas");
        assert_eq!(title_case("calaveras county"), "Calaveras County");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn categorical_renders_numbers_as_text() {
        assert_eq!(coerce(&Value::Integer(2023), SemanticType::Categorical, CoercionHint::Plain), text("2023"));
        assert_eq!(coerce(&text(" All "), SemanticType::Categorical, CoercionHint::Plain), text("All"));
    }

    #[test]
    fn flags() {
        assert_eq!(coerce(&text("Yes"), SemanticType::Flag, CoercionHint::Plain), Value::Flag(true));
        assert_eq!(coerce(&Value::Integer(0), SemanticType::Flag, CoercionHint::Plain), Value::Flag(false));
        assert!(coerce(&text("maybe"), SemanticType::Flag, CoercionHint::Plain).is_invalid());
    }
}
