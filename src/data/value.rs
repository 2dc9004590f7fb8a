use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::data::dtype::DType;

/// A node of caller-supplied input, before any typing decisions are made.
///
/// Maps keep their insertion order: the first key of a map decides which
/// ingestion shape it is.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(DateTime<Utc>),
    List(Vec<RawValue>),
    Map(Vec<(String, RawValue)>),
    Bytes(Vec<u8>),
}

impl RawValue {
    /// Build a map node from key/value pairs
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RawValue)>,
    {
        RawValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Value stored under `key` when this is a map
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        match self {
            RawValue::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Keys of a map node, in order. Empty for anything else.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            RawValue::Map(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Short shape name used in diagnostics and errors
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Int(_) | RawValue::Float(_) => "number",
            RawValue::Str(_) => "string",
            RawValue::DateTime(_) => "datetime",
            RawValue::List(_) => "list",
            RawValue::Map(_) => "map",
            RawValue::Bytes(_) => "bytes",
        }
    }

    /// Numeric view of a scalar, following loose numeric coercion:
    /// booleans are 0/1, numeric strings parse, datetimes become epoch millis.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            RawValue::Int(i) => Some(*i as f64),
            RawValue::Float(f) => Some(*f),
            RawValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            RawValue::Str(s) => parse_numeric(s),
            RawValue::DateTime(dt) => Some(dt.timestamp_millis() as f64),
            _ => None,
        }
    }
}

/// Parse numeric text. Blank strings, NaN and infinity spellings are not
/// numbers, nor is text whose value overflows to infinity.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Exact INT64 for a whole number inside the INT64 range, otherwise the float back
pub fn exact_i64(x: f64) -> std::result::Result<i64, f64> {
    // 2^63; `i64::MAX as f64` rounds up to this value
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if x.fract() == 0.0 && (-LIMIT..LIMIT).contains(&x) {
        Ok(x as i64)
    } else {
        Err(x)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Str(s) => write!(f, "{}", s),
            RawValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            RawValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            RawValue::Map(_) => write!(f, "[object]"),
            RawValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<JsonValue> for RawValue {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => RawValue::Null,
            JsonValue::Bool(b) => RawValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RawValue::Int(i)
                } else {
                    RawValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => RawValue::Str(s),
            JsonValue::Array(items) => RawValue::List(items.into_iter().map(RawValue::from).collect()),
            JsonValue::Object(obj) => {
                RawValue::Map(obj.into_iter().map(|(k, v)| (k, RawValue::from(v))).collect())
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Str(s.to_string())
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl From<f64> for RawValue {
    fn from(f: f64) -> Self {
        RawValue::Float(f)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

/// A single cell as reported by the engine or used as a filter operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Scalar::Null => JsonValue::Null,
            Scalar::Bool(b) => JsonValue::Bool(*b),
            Scalar::Int(i) => JsonValue::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Scalar::Str(s) => JsonValue::String(s.clone()),
        }
    }

    /// Convert a JSON scalar. Arrays and objects are not scalars.
    pub fn from_json(json: &JsonValue) -> Option<Self> {
        match json {
            JsonValue::Null => Some(Scalar::Null),
            JsonValue::Bool(b) => Some(Scalar::Bool(*b)),
            JsonValue::Number(n) => Some(match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            JsonValue::String(s) => Some(Scalar::Str(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, ""),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Typed storage for one canonical column. `None` is the null sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
    /// Epoch milliseconds
    Time(Vec<Option<i64>>),
}

impl ColumnData {
    /// Empty column of the given type
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Int32 => ColumnData::Int32(Vec::new()),
            DType::Int64 => ColumnData::Int64(Vec::new()),
            DType::Float32 => ColumnData::Float32(Vec::new()),
            DType::Float64 => ColumnData::Float64(Vec::new()),
            DType::Bool => ColumnData::Bool(Vec::new()),
            DType::String => ColumnData::Str(Vec::new()),
            DType::Time => ColumnData::Time(Vec::new()),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            ColumnData::Int32(_) => DType::Int32,
            ColumnData::Int64(_) => DType::Int64,
            ColumnData::Float32(_) => DType::Float32,
            ColumnData::Float64(_) => DType::Float64,
            ColumnData::Bool(_) => DType::Bool,
            ColumnData::Str(_) => DType::String,
            ColumnData::Time(_) => DType::Time,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
            ColumnData::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `index` as a scalar; nulls and out-of-range reads are `Scalar::Null`
    pub fn get(&self, index: usize) -> Scalar {
        match self {
            ColumnData::Int32(v) => v.get(index).copied().flatten().map_or(Scalar::Null, |x| Scalar::Int(x as i64)),
            ColumnData::Int64(v) | ColumnData::Time(v) => {
                v.get(index).copied().flatten().map_or(Scalar::Null, Scalar::Int)
            }
            ColumnData::Float32(v) => v.get(index).copied().flatten().map_or(Scalar::Null, |x| Scalar::Float(x as f64)),
            ColumnData::Float64(v) => v.get(index).copied().flatten().map_or(Scalar::Null, Scalar::Float),
            ColumnData::Bool(v) => v.get(index).copied().flatten().map_or(Scalar::Null, Scalar::Bool),
            ColumnData::Str(v) => v
                .get(index)
                .cloned()
                .flatten()
                .map_or(Scalar::Null, Scalar::Str),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.get(i).is_null()).count()
    }

    /// Build a typed column from scalars. Returns the column and how many
    /// non-null values could not be stored as `dtype` and became null.
    pub fn from_scalars<I>(dtype: DType, values: I) -> (Self, usize)
    where
        I: IntoIterator<Item = Scalar>,
    {
        let mut rejected = 0usize;
        let values = values.into_iter();
        let column = match dtype {
            DType::Int32 => ColumnData::Int32(
                values
                    .map(|v| {
                        let x = scalar_to_i64(&v).and_then(|i| i32::try_from(i).ok());
                        keep(x, v.is_null(), &mut rejected)
                    })
                    .collect(),
            ),
            DType::Int64 => ColumnData::Int64(
                values
                    .map(|v| keep(scalar_to_i64(&v), v.is_null(), &mut rejected))
                    .collect(),
            ),
            DType::Time => ColumnData::Time(
                values
                    .map(|v| keep(scalar_to_i64(&v), v.is_null(), &mut rejected))
                    .collect(),
            ),
            DType::Float64 => ColumnData::Float64(
                values
                    .map(|v| keep(scalar_to_f64(&v), v.is_null(), &mut rejected))
                    .collect(),
            ),
            DType::Float32 => ColumnData::Float32(
                values
                    .map(|v| keep(scalar_to_f64(&v).map(|x| x as f32), v.is_null(), &mut rejected))
                    .collect(),
            ),
            DType::Bool => ColumnData::Bool(
                values
                    .map(|v| {
                        let b = match &v {
                            Scalar::Bool(b) => Some(*b),
                            Scalar::Int(i) => Some(*i != 0),
                            Scalar::Float(f) => Some(*f != 0.0),
                            Scalar::Str(s) if s.eq_ignore_ascii_case("true") => Some(true),
                            Scalar::Str(s) if s.eq_ignore_ascii_case("false") => Some(false),
                            _ => None,
                        };
                        keep(b, v.is_null(), &mut rejected)
                    })
                    .collect(),
            ),
            DType::String => ColumnData::Str(
                values
                    .map(|v| match v {
                        Scalar::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
            ),
        };
        (column, rejected)
    }
}

/// Count a failed conversion of a present value
fn keep<T>(value: Option<T>, is_null: bool, rejected: &mut usize) -> Option<T> {
    if value.is_none() && !is_null {
        *rejected += 1;
    }
    value
}

fn scalar_to_i64(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Int(i) => Some(*i),
        Scalar::Float(f) => exact_i64(*f).ok(),
        Scalar::Bool(b) => Some(i64::from(*b)),
        Scalar::Str(s) => s.trim().parse::<i64>().ok(),
        Scalar::Null => None,
    }
}

fn scalar_to_f64(value: &Scalar) -> Option<f64> {
    match value {
        Scalar::Int(i) => Some(*i as f64),
        Scalar::Float(f) => Some(*f),
        Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Scalar::Str(s) => parse_numeric(s),
        Scalar::Null => None,
    }
}
