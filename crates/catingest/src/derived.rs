//! Derived-value registry
//!
//! A closed set of computations keyed by destination column name. Lookups
//! happen once, when the column mapping table is built.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::Serialize;
use std::fmt;

use crate::value::{parse_timestamp, Value};

/// Bands a filter name may start with.
pub const BANDS: [char; 6] = ['u', 'g', 'r', 'i', 'z', 'Y'];

/// Observations before this local hour belong to the previous night.
pub const NITE_ROLLOVER_HOUR: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DerivedFn {
    /// Band code from a filter name (`"r DECam SDSS c0002 6415.0 1480.0"` -> `r`)
    Band,
    /// Observing night from an observation timestamp, as `YYYYMMDD`
    Nite,
}

impl DerivedFn {
    pub fn for_column(column: &str) -> Option<Self> {
        match column.trim().to_uppercase().as_str() {
            "BAND" => Some(DerivedFn::Band),
            "NITE" => Some(DerivedFn::Nite),
            _ => None,
        }
    }

    pub fn apply(self, input: &Value) -> Result<Value, String> {
        match self {
            DerivedFn::Band => band(input),
            DerivedFn::Nite => nite(input),
        }
    }
}

impl fmt::Display for DerivedFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivedFn::Band => f.write_str("BAND"),
            DerivedFn::Nite => f.write_str("NITE"),
        }
    }
}

fn band(input: &Value) -> Result<Value, String> {
    let Value::Text(filter) = input else {
        return Err(format!("filter name must be text, got '{}'", input));
    };
    match filter.trim().chars().next() {
        Some(c) if BANDS.contains(&c) => Ok(Value::Text(c.to_string())),
        Some(c) => Err(format!("unknown band '{}' in filter '{}'", c, filter.trim())),
        None => Err("empty filter name".to_string()),
    }
}

fn nite(input: &Value) -> Result<Value, String> {
    let observed: NaiveDateTime = match input {
        Value::Timestamp(ts) => *ts,
        Value::Text(text) => parse_timestamp(text.trim(), None)
            .ok_or_else(|| format!("unparseable observation time '{}'", text.trim()))?,
        other => return Err(format!("observation time must be a timestamp, got '{}'", other)),
    };

    let date = if observed.hour() >= NITE_ROLLOVER_HOUR {
        observed.date()
    } else {
        observed.date() - Duration::days(1)
    };
    Ok(Value::Text(date.format("%Y%m%d").to_string()))
}
