use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Semantic type a column is contracted to hold once cleaned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Categorical,
    Numeric,
    Integer,
    Date,
    Identifier,
    Flag,
}

impl SemanticType {
    /// Whether a present value has the shape this type demands.
    /// Missing markers always conform; nullability is checked separately.
    pub fn conforms(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Missing(_)) => true,
            (SemanticType::Categorical | SemanticType::Identifier, Value::Text(_)) => true,
            (SemanticType::Numeric, Value::Number(n)) => n.is_finite(),
            (SemanticType::Integer, Value::Integer(_)) => true,
            (SemanticType::Date, Value::Date(_)) => true,
            (SemanticType::Flag, Value::Flag(_)) => true,
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SemanticType::Numeric | SemanticType::Integer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Categorical => "categorical",
            SemanticType::Numeric => "numeric",
            SemanticType::Integer => "integer",
            SemanticType::Date => "date",
            SemanticType::Identifier => "identifier",
            SemanticType::Flag => "flag",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cell holds no value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Missing {
    /// Blank or absent upstream
    Absent,
    /// Present upstream but could not be coerced; keeps the raw text
    Invalid(String),
}

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Integer(i64),
    Date(NaiveDate),
    Flag(bool),
    Missing(Missing),
}

impl Value {
    pub fn absent() -> Self {
        Value::Missing(Missing::Absent)
    }

    pub fn invalid(raw: impl Into<String>) -> Self {
        Value::Missing(Missing::Invalid(raw.into()))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Missing(Missing::Invalid(_)))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text used in validation examples and audit output. Unlike `Display`,
    /// a missing marker is spelled out so it cannot be mistaken for an empty string.
    pub fn describe(&self) -> String {
        match self {
            Value::Missing(Missing::Absent) => "<missing>".to_string(),
            Value::Missing(Missing::Invalid(raw)) => raw.clone(),
            other => other.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Flag(_) => 0,
            Value::Integer(_) => 1,
            Value::Number(_) => 2,
            Value::Date(_) => 3,
            Value::Text(_) => 4,
            Value::Missing(Missing::Invalid(_)) => 5,
            Value::Missing(Missing::Absent) => 6,
        }
    }

    /// Total order used for deterministic row sorting. Missing values sort last.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(a), Value::Number(b)) => (*a as f64).total_cmp(b),
            (Value::Number(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Flag(a), Value::Flag(b)) => a.cmp(b),
            (Value::Missing(Missing::Invalid(a)), Value::Missing(Missing::Invalid(b))) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Stable textual key used for grouping rows
    pub fn group_key(&self) -> String {
        match self {
            Value::Text(s) => format!("t:{s}"),
            Value::Number(n) => format!("n:{n:?}"),
            Value::Integer(i) => format!("i:{i}"),
            Value::Date(d) => format!("d:{d}"),
            Value::Flag(b) => format!("f:{b}"),
            Value::Missing(_) => "m:".to_string(),
        }
    }
}

impl fmt::Display for Value {
    /// Export rendering. Missing values render as an empty cell.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{n}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Flag(b) => write!(f, "{b}"),
            Value::Missing(_) => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Flag(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_marker_is_distinct_from_zero_and_empty_text() {
        let missing = Value::absent();
        assert_ne!(missing, Value::Number(0.0));
        assert_ne!(missing, Value::text(""));
        assert!(missing.is_missing());
        assert_eq!(missing.describe(), "<missing>");
        assert_eq!(Value::invalid("n/a").describe(), "n/a");
    }

    #[test]
    fn missing_sorts_after_present_values() {
        let mut values = vec![Value::absent(), Value::Number(3.0), Value::Number(1.0)];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(values[0], Value::Number(1.0));
        assert_eq!(values[1], Value::Number(3.0));
        assert!(values[2].is_missing());
    }

    #[test]
    fn conformance_ignores_missing() {
        assert!(SemanticType::Numeric.conforms(&Value::absent()));
        assert!(SemanticType::Numeric.conforms(&Value::Number(1.5)));
        assert!(!SemanticType::Numeric.conforms(&Value::text("1.5")));
        assert!(!SemanticType::Numeric.conforms(&Value::Number(f64::NAN)));
        assert!(SemanticType::Identifier.conforms(&Value::text("95249")));
    }

    #[test]
    fn display_renders_whole_numbers_without_fraction() {
        assert_eq!(Value::Number(150.0).to_string(), "150");
        assert_eq!(Value::Number(0.052).to_string(), "0.052");
        assert_eq!(Value::absent().to_string(), "");
    }
}
