use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque runtime value produced by tag resolution and stored in definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QsValue {
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<QsValue>),
    Map(BTreeMap<String, QsValue>),
}

impl QsValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::String(value) => value.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::String(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Loose truthiness used by guards: `false`, `0`, empty text and empty
    /// collections are false, the literal text "false" is false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0,
            Self::String(value) => {
                let trimmed = value.trim();
                !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("false")
            }
            Self::Array(values) => !values.is_empty(),
            Self::Map(values) => !values.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

impl fmt::Display for QsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => {
                if value.fract().abs() < f64::EPSILON && value.abs() < i64::MAX as f64 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{}", value)
                }
            }
            Self::String(value) => f.write_str(value),
            Self::Array(values) => {
                let parts = values.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "li@{}", parts.join("|"))
            }
            Self::Map(values) => {
                let parts = values
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value))
                    .collect::<Vec<_>>();
                write!(f, "map@{}", parts.join(";"))
            }
        }
    }
}

impl From<&str> for QsValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QsValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for QsValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for QsValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_integral_numbers_without_fraction() {
        assert_eq!(QsValue::Number(3.0).to_string(), "3");
        assert_eq!(QsValue::Number(2.5).to_string(), "2.5");
        assert_eq!(
            QsValue::Array(vec![QsValue::from("a"), QsValue::Number(1.0)]).to_string(),
            "li@a|1"
        );
    }

    #[test]
    fn truthiness_follows_loose_guard_rules() {
        assert!(QsValue::from("yes").is_truthy());
        assert!(!QsValue::from("FALSE").is_truthy());
        assert!(!QsValue::from("  ").is_truthy());
        assert!(!QsValue::Number(0.0).is_truthy());
        assert!(QsValue::Map(BTreeMap::from([("a".to_string(), QsValue::Bool(false))])).is_truthy());
    }

    #[test]
    fn untagged_serde_keeps_plain_json_shape() {
        let value = QsValue::Map(BTreeMap::from([
            ("n".to_string(), QsValue::Number(1.0)),
            ("s".to_string(), QsValue::from("x")),
        ]));
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, r#"{"n":1.0,"s":"x"}"#);
        let back: QsValue = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, value);
    }
}
