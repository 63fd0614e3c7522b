use crate::error::EvaluationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date formats accepted when reading extracted date fields.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d"];

/// Runtime value types used during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Number(f64),
    Currency(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
}

/// The declared data type of a field or constant in its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Number,
    Currency,
    Text,
    Date,
    #[serde(alias = "bool")]
    Boolean,
}

impl Value {
    /// Returns the numeric payload of numbers and currency amounts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) | Value::Currency(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Currency(_) => "Currency",
            Value::Bool(_) => "Bool",
            Value::Text(_) => "Text",
            Value::Date(_) => "Date",
        }
    }

    /// Converts a literal from a canvas or catalog into a value. Strings that
    /// read as numbers become numbers so "0.15" and 0.15 compile identically.
    pub fn from_literal(raw: &serde_json::Value) -> Option<Value> {
        match raw {
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else if let Ok(n) = trimmed.parse::<f64>() {
                    Some(Value::Number(n))
                } else {
                    Some(Value::Text(trimmed.to_string()))
                }
            }
            _ => None,
        }
    }

    /// Reads a raw extracted value as the field's declared data type.
    pub fn coerce(
        field: &str,
        raw: &serde_json::Value,
        data_type: DataType,
    ) -> Result<Value, EvaluationError> {
        if raw.is_null() {
            return Err(EvaluationError::MissingField(field.to_string()));
        }
        let invalid = || EvaluationError::InvalidFieldValue {
            field: field.to_string(),
            expected: format!("{:?}", data_type),
            raw: raw.to_string(),
        };
        match data_type {
            DataType::Number => read_number(raw).map(Value::Number).ok_or_else(invalid),
            DataType::Currency => read_number(raw).map(Value::Currency).ok_or_else(invalid),
            DataType::Boolean => match raw {
                serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
                serde_json::Value::Number(n) => Ok(Value::Bool(n.as_f64() != Some(0.0))),
                serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "y" | "1" | "x" => Ok(Value::Bool(true)),
                    "false" | "no" | "n" | "0" | "" => Ok(Value::Bool(false)),
                    _ => Err(invalid()),
                },
                _ => Err(invalid()),
            },
            DataType::Date => match raw {
                serde_json::Value::String(s) => parse_date(s).map(Value::Date).ok_or_else(invalid),
                _ => Err(invalid()),
            },
            DataType::Text => match raw {
                serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
                serde_json::Value::Number(n) => Ok(Value::Text(n.to_string())),
                serde_json::Value::Bool(b) => Ok(Value::Text(b.to_string())),
                _ => Err(invalid()),
            },
        }
    }
}

/// Reads a number from a JSON number or a formatted string such as "$ 1,234.50".
fn read_number(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            let value = cleaned.parse::<f64>().ok()?;
            // Accounting notation: (123.45) is negative.
            let trimmed = s.trim();
            if trimmed.starts_with('(') && trimmed.ends_with(')') {
                Some(-value.abs())
            } else {
                Some(value)
            }
        }
        _ => None,
    }
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) | Value::Currency(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Text(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Value::Date(d) => write!(f, "\"{}\"", d.format("%Y-%m-%d")),
        }
    }
}
