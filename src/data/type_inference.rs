//! Shared type inference logic for ingestion
//!
//! Decides a column's DType from sample values. Inference is deliberately
//! cheap: a value-level rule table plus a bounded leading sample per column.

use crate::data::date_parser::DateParser;
use crate::data::dtype::DType;
use crate::data::value::{parse_numeric, RawValue};

/// Integers below this magnitude (and non-zero) are treated as INT32
pub const SMALL_INT_LIMIT: f64 = 10_000.0;

/// Default number of present values sampled per column
pub const DEFAULT_TYPE_SAMPLE: usize = 100;

/// Type inference utilities
pub struct TypeInference<'a> {
    parser: &'a dyn DateParser,
    sample_limit: usize,
}

impl<'a> TypeInference<'a> {
    pub fn new(parser: &'a dyn DateParser) -> Self {
        Self {
            parser,
            sample_limit: DEFAULT_TYPE_SAMPLE,
        }
    }

    pub fn with_sample_limit(mut self, sample_limit: usize) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    /// Infer the type of a single value. `None` means unknown: the value does
    /// not fix the column's type.
    ///
    /// Rules apply in order and the first match wins. Small non-zero integers
    /// stay INT32 so low-cardinality identifiers are not promoted to floats.
    pub fn infer(&self, value: &RawValue) -> Option<DType> {
        match value {
            RawValue::Null => None,
            RawValue::Int(i) => Some(Self::classify_number(*i as f64)),
            RawValue::Float(f) => Some(Self::classify_number(*f)),
            RawValue::Bool(_) => Some(DType::Bool),
            RawValue::DateTime(_) => Some(DType::Time),
            RawValue::Str(s) => Some(self.infer_str(s)),
            RawValue::List(_) | RawValue::Map(_) | RawValue::Bytes(_) => Some(DType::String),
        }
    }

    fn classify_number(x: f64) -> DType {
        if x.fract() == 0.0 && x.abs() < SMALL_INT_LIMIT && x != 0.0 {
            DType::Int32
        } else {
            DType::Float64
        }
    }

    fn infer_str(&self, s: &str) -> DType {
        if parse_numeric(s).is_some() {
            return DType::Float64;
        }
        if self.parser.is_date(s) {
            return DType::Time;
        }
        if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
            return DType::Bool;
        }
        DType::String
    }

    /// Infer a column type from its leading present values.
    ///
    /// Missing values (`None` items) are skipped and do not count towards the
    /// sample limit; nulls do count. The first value with a known type wins,
    /// and a column with no typed sample defaults to STRING. A column whose
    /// typed data starts after the sample window can be misclassified; that
    /// is the accepted cost of bounding inference on large inputs.
    pub fn infer_column<'v, I>(&self, values: I) -> DType
    where
        I: IntoIterator<Item = Option<&'v RawValue>>,
    {
        values
            .into_iter()
            .flatten()
            .take(self.sample_limit)
            .find_map(|v| self.infer(v))
            .unwrap_or(DType::String)
    }
}
