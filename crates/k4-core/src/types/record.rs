//! The minimal view the pagination engine needs of a fetched record.
//!
//! Records are otherwise opaque: the engine only asks for an identity (for
//! dedup), a timestamp (for ordering and windowing), and named fields (for
//! cursor extraction).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record returned by a page source.
pub trait Record {
    /// Identity used for dedup, if the record carries one.
    fn id(&self) -> Option<String>;

    /// Timestamp in milliseconds, if the record carries one.
    fn timestamp(&self) -> Option<i64>;

    /// Look up a raw field by name (used to read continuation cursors).
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Interpret a JSON scalar as an integer millisecond timestamp.
fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Unified JSON records as produced by the parsing layer.
///
/// Objects expose `id`, `timestamp`, and cursor fields from their raw `info`
/// payload (falling back to the top level). Arrays are OHLCV rows whose first
/// element is the timestamp.
impl Record for Value {
    fn id(&self) -> Option<String> {
        match self.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn timestamp(&self) -> Option<i64> {
        match self {
            Value::Array(row) => row.first().and_then(value_as_i64),
            Value::Object(map) => map.get("timestamp").and_then(value_as_i64),
            _ => None,
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.get("info")
            .and_then(|info| info.get(name))
            .or_else(|| self.get(name))
            .filter(|v| !v.is_null())
            .cloned()
    }
}

/// A single candle: `[timestamp, open, high, low, close, volume]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Record for Ohlcv {
    fn id(&self) -> Option<String> {
        None
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

impl TryFrom<&Value> for Ohlcv {
    type Error = crate::error::K4Error;

    fn try_from(v: &Value) -> Result<Self, Self::Error> {
        let bad = || crate::error::K4Error::Parse(format!("not an OHLCV row: {v}"));
        let row = v.as_array().filter(|r| r.len() >= 6).ok_or_else(bad)?;
        let num = |i: usize| -> Result<f64, Self::Error> {
            match &row[i] {
                Value::Number(n) => n.as_f64().ok_or_else(bad),
                Value::String(s) => s.parse().map_err(|_| bad()),
                _ => Err(bad()),
            }
        };
        Ok(Self {
            timestamp: value_as_i64(&row[0]).ok_or_else(bad)?,
            open: num(1)?,
            high: num(2)?,
            low: num(3)?,
            close: num(4)?,
            volume: num(5)?,
        })
    }
}
