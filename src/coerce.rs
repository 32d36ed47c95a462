use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

const NULL_TOKENS: [&str; 4] = ["na", "n/a", "null", "none"];

/// A single coerced cell as written to, and read back from, the relational store.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    /// Stringified, trimmed value; `None` for null or blank cells.
    pub fn clean_text(&self) -> Option<String> {
        let text = match self {
            Self::Null => return None,
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => value.to_string(),
            Self::Text(value) => value.trim().to_string(),
        };

        if text.is_empty() { None } else { Some(text) }
    }

    pub fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(value) => Self::Integer(value),
            ValueRef::Real(value) => Self::Real(value),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Self::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Owned(Value::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

/// Classifies raw CSV cells into nulls, integers, floats or text.
///
/// Integer-looking cells lose leading zeros (`"007"` becomes `7`); postal codes
/// and zero-padded identifiers are affected.
pub struct ValueCoercer {
    integer: Regex,
    real: Regex,
}

impl ValueCoercer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            integer: Regex::new(r"^[-+]?\d+$").context("failed to compile integer pattern")?,
            real: Regex::new(r"^[-+]?\d+\.\d+$").context("failed to compile real pattern")?,
        })
    }

    pub fn coerce(&self, raw: Option<&str>) -> CellValue {
        let Some(raw) = raw else {
            return CellValue::Null;
        };

        let trimmed = raw.trim();
        if trimmed.is_empty()
            || NULL_TOKENS
                .iter()
                .any(|token| trimmed.eq_ignore_ascii_case(token))
        {
            return CellValue::Null;
        }

        if self.integer.is_match(trimmed) {
            if let Ok(value) = trimmed.parse::<i64>() {
                return CellValue::Integer(value);
            }
            return CellValue::Text(trimmed.to_string());
        }

        if self.real.is_match(trimmed) {
            if let Ok(value) = trimmed.parse::<f64>() {
                return CellValue::Real(value);
            }
        }

        CellValue::Text(trimmed.to_string())
    }
}
