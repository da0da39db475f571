//! Cell values and coercion to declared datatypes

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::ProjectionError;
use crate::mapping::Datatype;

/// One cell read from a catalog file or written to a destination row.
///
/// Arrays only appear on the source side; destination rows hold scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Array(Vec<Value>),
}

impl Value {
    /// Infer a scalar from raw text: integer, then float, otherwise text.
    /// Empty input becomes `Null`.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => integral(*f),
            Value::Text(s) => {
                let s = s.trim();
                s.parse().ok().or_else(|| s.parse::<f64>().ok().and_then(integral))
            },
            _ => None,
        }
    }

    /// Element `position` of an array, or the value itself when scalar and
    /// `position` is 0.
    pub fn element(&self, position: usize) -> Option<&Value> {
        match self {
            Value::Array(items) => items.get(position),
            scalar if position == 0 => Some(scalar),
            _ => None,
        }
    }

    /// Number of elements: array length, 1 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Array(items) if items.is_empty())
    }

    /// Coerce to the declared datatype of destination `column`.
    pub fn coerce(
        &self,
        datatype: Datatype,
        date_format: Option<&str>,
        column: &str,
    ) -> Result<Value, ProjectionError> {
        let fail = || ProjectionError::Coercion {
            column: column.to_string(),
            datatype,
            value: self.to_string(),
        };

        match (datatype, self) {
            (_, Value::Null) => Ok(Value::Null),
            (_, Value::Array(_)) => Err(fail()),

            (Datatype::Integer, Value::Int(i)) => Ok(Value::Int(*i)),
            (Datatype::Integer, Value::Text(s)) if s.trim().is_empty() => Ok(Value::Null),
            (Datatype::Integer, Value::Float(_) | Value::Text(_)) => {
                self.as_i64().map(Value::Int).ok_or_else(fail)
            },
            (Datatype::Integer, Value::Timestamp(_)) => Err(fail()),

            (Datatype::Float | Datatype::Decimal, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (Datatype::Float | Datatype::Decimal, Value::Float(f)) => Ok(Value::Float(*f)),
            (Datatype::Float | Datatype::Decimal, Value::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(Value::Null);
                }
                trimmed.parse::<f64>().map(Value::Float).map_err(|_| fail())
            },
            (Datatype::Float | Datatype::Decimal, Value::Timestamp(_)) => Err(fail()),

            (Datatype::Char, scalar) => Ok(Value::Text(scalar.to_string().trim().to_string())),

            (Datatype::Date, Value::Timestamp(ts)) => Ok(Value::Timestamp(*ts)),
            (Datatype::Date, Value::Text(s)) => {
                parse_timestamp(s.trim(), date_format).map(Value::Timestamp).ok_or_else(fail)
            },
            (Datatype::Date, Value::Int(_) | Value::Float(_)) => Err(fail()),
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    // 2^63 is the first f64 past i64::MAX
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// Parse a timestamp with an explicit strftime format, or ISO-8601 forms
/// (with or without fractional seconds, `T` or space separator, or a bare
/// date) when none is given.
pub fn parse_timestamp(text: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    if let Some(format) = format {
        return NaiveDateTime::parse_from_str(text, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            });
    }

    const ISO_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    ISO_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Timestamp(_) => serializer.serialize_str(&self.to_string()),
            Value::Array(items) => items.serialize(serializer),
        }
    }
}
