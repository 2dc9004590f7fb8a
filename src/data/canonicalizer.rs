//! Canonicalization of heterogeneous input into one columnar dataset
//!
//! Four input shapes are recognised structurally, in this order:
//! binary buffer, column-major map (first value is a list), schema-only map
//! (first value is a type tag string) and row-major list of field maps.

use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::data::columnar_decoder::ColumnarDecoder;
use crate::data::date_parser::DateParser;
use crate::data::dtype::{ColumnSchema, DType};
use crate::data::type_inference::TypeInference;
use crate::data::value::{exact_i64, ColumnData, RawValue};
use crate::diagnostics::{Component, Diagnostic};
use crate::error::{Result, ViewError};

/// The uniform in-memory form handed to the engine's table builder.
///
/// `names`, `types` and `columns` are parallel and every column holds exactly
/// `row_count` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalDataset {
    pub row_count: usize,
    pub names: Vec<String>,
    pub types: Vec<DType>,
    pub columns: Vec<ColumnData>,
    /// Set when the data came from a columnar binary buffer
    pub is_arrow: bool,
    pub warnings: Vec<Diagnostic>,
}

impl CanonicalDataset {
    pub fn schema(&self) -> Result<ColumnSchema> {
        ColumnSchema::from_parts(&self.names, &self.types)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.columns.get(idx))
    }

    pub fn column_count(&self) -> usize {
        self.names.len()
    }
}

/// Structural classification of an input
enum InputShape<'d> {
    Buffer(&'d [u8]),
    ColumnMajor(&'d [(String, RawValue)]),
    SchemaOnly(&'d [(String, RawValue)]),
    RowMajor(&'d [RawValue]),
}

/// Converts raw input into a [`CanonicalDataset`]
pub struct Canonicalizer<'a> {
    parser: &'a dyn DateParser,
    decoder: Option<&'a dyn ColumnarDecoder>,
    config: IngestConfig,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(parser: &'a dyn DateParser) -> Self {
        Self {
            parser,
            decoder: None,
            config: IngestConfig::default(),
        }
    }

    pub fn with_decoder(mut self, decoder: &'a dyn ColumnarDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_config(mut self, config: &IngestConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Canonicalize `data`. A prior schema, when given, is authoritative for
    /// names and types and skips inference.
    pub fn canonicalize(
        &self,
        data: &RawValue,
        prior: Option<&ColumnSchema>,
    ) -> Result<CanonicalDataset> {
        let dataset = match Self::detect_shape(data)? {
            InputShape::Buffer(bytes) => self.from_buffer(bytes)?,
            InputShape::ColumnMajor(entries) => self.from_columns(entries, prior)?,
            InputShape::SchemaOnly(entries) => self.from_schema(entries)?,
            InputShape::RowMajor(rows) => self.from_rows(rows, prior)?,
        };

        // Names must be unique; the schema constructor enforces it
        dataset.schema()?;

        debug!(
            target: "ingest",
            "Canonicalized {} rows x {} columns (arrow={}, warnings={})",
            dataset.row_count,
            dataset.column_count(),
            dataset.is_arrow,
            dataset.warnings.len()
        );
        Ok(dataset)
    }

    fn detect_shape(data: &RawValue) -> Result<InputShape<'_>> {
        match data {
            RawValue::Bytes(bytes) => Ok(InputShape::Buffer(bytes)),
            RawValue::Map(entries) => match entries.first() {
                Some((_, RawValue::List(_))) => Ok(InputShape::ColumnMajor(entries)),
                Some((_, RawValue::Str(_))) => Ok(InputShape::SchemaOnly(entries)),
                Some((key, value)) => Err(ViewError::UnsupportedShape {
                    found: format!("map whose first entry '{}' is a {}", key, value.kind()),
                }),
                None => Err(ViewError::UnsupportedShape {
                    found: "empty map".to_string(),
                }),
            },
            RawValue::List(rows) => Ok(InputShape::RowMajor(rows)),
            other => Err(ViewError::UnsupportedShape {
                found: other.kind().to_string(),
            }),
        }
    }

    fn from_rows(&self, rows: &[RawValue], prior: Option<&ColumnSchema>) -> Result<CanonicalDataset> {
        if let Some(idx) = rows.iter().position(|r| !matches!(r, RawValue::Map(_))) {
            return Err(ViewError::UnsupportedShape {
                found: format!("row {} is a {}, expected a map", idx, rows[idx].kind()),
            });
        }

        let mut warnings = Vec::new();

        let (names, declared): (Vec<String>, Option<Vec<DType>>) = match prior {
            Some(schema) => (schema.names(), Some(schema.types())),
            None => {
                if rows.is_empty() {
                    return Err(ViewError::EmptyUntypedInput);
                }
                (self.sample_column_names(rows, &mut warnings), None)
            }
        };

        let inference = TypeInference::new(self.parser).with_sample_limit(self.config.type_sample_values);

        let mut types = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            let dtype = match &declared {
                Some(types) => types[idx],
                None => inference.infer_column(rows.iter().map(|row| row.get(name))),
            };
            let (data, final_type) =
                self.coerce_column(name, dtype, rows.iter().map(|row| row.get(name)), &mut warnings);
            types.push(final_type);
            columns.push(data);
        }

        Ok(CanonicalDataset {
            row_count: rows.len(),
            names,
            types,
            columns,
            is_arrow: false,
            warnings,
        })
    }

    /// Widest key set among the leading rows. Each time a wider row is seen
    /// the sample window doubles, so late-widening inputs get a longer look.
    fn sample_column_names(&self, rows: &[RawValue], warnings: &mut Vec<Diagnostic>) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut limit = self.config.key_sample_rows;
        let mut reported = false;
        let mut ix = 0;

        while ix < limit && ix < rows.len() {
            let keys = rows[ix].keys();
            if names.is_empty() {
                names = keys.iter().map(|k| k.to_string()).collect();
            } else if keys.len() != names.len() {
                if !reported && self.config.warn_on_inconsistent_rows {
                    warn!(target: "ingest", "Row data has inconsistent key sets (row {})", ix);
                    warnings.push(Diagnostic::new(
                        Component::Ingest,
                        format!("row {} has {} keys, expected {}", ix, keys.len(), names.len()),
                    ));
                    reported = true;
                }
                if keys.len() > names.len() {
                    warn!(target: "ingest", "Extending columns from {} to {}", names.len(), keys.len());
                    warnings.push(Diagnostic::new(
                        Component::Ingest,
                        format!("extending columns from {} to {}", names.len(), keys.len()),
                    ));
                    names = keys.iter().map(|k| k.to_string()).collect();
                    limit = limit.saturating_mul(2);
                }
            }
            ix += 1;
        }
        names
    }

    fn from_columns(
        &self,
        entries: &[(String, RawValue)],
        prior: Option<&ColumnSchema>,
    ) -> Result<CanonicalDataset> {
        let inference = TypeInference::new(self.parser);
        let mut warnings = Vec::new();
        let mut names = Vec::with_capacity(entries.len());
        let mut types = Vec::with_capacity(entries.len());
        let mut columns = Vec::with_capacity(entries.len());

        let mut row_count = 0;
        for (name, value) in entries {
            let RawValue::List(values) = value else {
                return Err(ViewError::UnsupportedShape {
                    found: format!("column '{}' is a {}, expected a list", name, value.kind()),
                });
            };
            row_count = row_count.max(values.len());

            // Only the first element decides the type
            let dtype = prior
                .and_then(|schema| schema.dtype_of(name))
                .or_else(|| values.first().and_then(|v| inference.infer(v)))
                .unwrap_or(DType::String);

            let (data, final_type) =
                self.coerce_column(name, dtype, values.iter().map(Some), &mut warnings);
            names.push(name.clone());
            types.push(final_type);
            columns.push(data);
        }

        // Short columns are padded with nulls so every column has row_count entries
        for (name, data) in names.iter().zip(columns.iter_mut()) {
            if data.len() < row_count {
                warnings.push(
                    Diagnostic::new(
                        Component::Ingest,
                        format!("padded {} missing values with null", row_count - data.len()),
                    )
                    .with_subject(name.clone()),
                );
                pad_column(data, row_count);
            }
        }

        Ok(CanonicalDataset {
            row_count,
            names,
            types,
            columns,
            is_arrow: false,
            warnings,
        })
    }

    fn from_schema(&self, entries: &[(String, RawValue)]) -> Result<CanonicalDataset> {
        let mut names = Vec::with_capacity(entries.len());
        let mut types = Vec::with_capacity(entries.len());
        for (name, value) in entries {
            let dtype = match value {
                RawValue::Str(tag) => DType::from_tag(tag),
                _ => None,
            }
            .ok_or_else(|| ViewError::UnknownTypeTag {
                column: name.clone(),
                tag: value.to_string(),
            })?;
            names.push(name.clone());
            types.push(dtype);
        }
        let columns = types.iter().map(|t| ColumnData::empty(*t)).collect();

        Ok(CanonicalDataset {
            row_count: 0,
            names,
            types,
            columns,
            is_arrow: false,
            warnings: Vec::new(),
        })
    }

    fn from_buffer(&self, bytes: &[u8]) -> Result<CanonicalDataset> {
        let decoder = self
            .decoder
            .ok_or_else(|| ViewError::Decode("no columnar decoder configured".to_string()))?;
        let decoded = decoder.decode(bytes)?;

        let warnings = decoded
            .skipped
            .iter()
            .map(|name| {
                Diagnostic::new(Component::Ingest, "unsupported column type, column skipped")
                    .with_subject(name.clone())
            })
            .collect();

        let mut names = Vec::with_capacity(decoded.columns.len());
        let mut types = Vec::with_capacity(decoded.columns.len());
        let mut columns = Vec::with_capacity(decoded.columns.len());
        for column in decoded.columns {
            names.push(column.name);
            types.push(column.data.dtype());
            columns.push(column.data);
        }

        Ok(CanonicalDataset {
            row_count: decoded.row_count,
            names,
            types,
            columns,
            is_arrow: true,
            warnings,
        })
    }

    /// Coerce one column's values to `dtype`. Returns the data and the final
    /// type, which differs from `dtype` only when an INT32 column is promoted
    /// to FLOAT64 because a value does not fit (overflow promotes, never truncates).
    fn coerce_column<'v, I>(
        &self,
        name: &str,
        dtype: DType,
        values: I,
        warnings: &mut Vec<Diagnostic>,
    ) -> (ColumnData, DType)
    where
        I: Iterator<Item = Option<&'v RawValue>>,
    {
        let mut rejected = 0usize;
        let mut numeric = |value: &RawValue| -> Option<f64> {
            if value.is_null() {
                return None;
            }
            let n = value.to_number();
            if n.is_none() {
                rejected += 1;
            }
            n
        };

        let result = match dtype {
            DType::Int32 => {
                let nums: Vec<Option<f64>> = values.map(|v| v.and_then(&mut numeric)).collect();
                let fits = nums.iter().flatten().all(|x| {
                    x.fract() == 0.0 && *x >= i32::MIN as f64 && *x <= i32::MAX as f64
                });
                if fits {
                    let ints = nums.into_iter().map(|x| x.map(|x| x as i32)).collect();
                    (ColumnData::Int32(ints), DType::Int32)
                } else {
                    debug!(target: "ingest", "Promoting column '{}' from INT32 to FLOAT64", name);
                    (ColumnData::Float64(nums), DType::Float64)
                }
            }
            DType::Int64 => {
                // Integers are read exactly; only floats and non-integer text go through f64
                let exact: Vec<Option<std::result::Result<i64, f64>>> = values
                    .map(|v| {
                        v.and_then(|v| match v {
                            RawValue::Int(i) => Some(Ok(*i)),
                            RawValue::Str(s) => match s.trim().parse::<i64>() {
                                Ok(i) => Some(Ok(i)),
                                Err(_) => numeric(v).map(exact_i64),
                            },
                            other => numeric(other).map(exact_i64),
                        })
                    })
                    .collect();
                if exact.iter().flatten().all(|x| x.is_ok()) {
                    let ints = exact.into_iter().map(|x| x.and_then(|x| x.ok())).collect();
                    (ColumnData::Int64(ints), DType::Int64)
                } else {
                    debug!(target: "ingest", "Promoting column '{}' from INT64 to FLOAT64", name);
                    let floats = exact
                        .into_iter()
                        .map(|x| {
                            x.map(|x| match x {
                                Ok(i) => i as f64,
                                Err(f) => f,
                            })
                        })
                        .collect();
                    (ColumnData::Float64(floats), DType::Float64)
                }
            }
            DType::Float64 => (
                ColumnData::Float64(values.map(|v| v.and_then(&mut numeric)).collect()),
                DType::Float64,
            ),
            DType::Float32 => (
                ColumnData::Float32(
                    values
                        .map(|v| v.and_then(&mut numeric).map(|x| x as f32))
                        .collect(),
                ),
                DType::Float32,
            ),
            DType::Bool => (
                ColumnData::Bool(values.map(|v| v.and_then(coerce_bool)).collect()),
                DType::Bool,
            ),
            DType::Time => {
                let parsed = values
                    .map(|v| {
                        let v = v?;
                        if v.is_null() {
                            return None;
                        }
                        let ms = self.parser.parse(v);
                        if ms.is_none() {
                            rejected += 1;
                        }
                        ms
                    })
                    .collect();
                (ColumnData::Time(parsed), DType::Time)
            }
            DType::String => (
                ColumnData::Str(
                    values
                        .map(|v| {
                            v.map(|v| match v {
                                RawValue::Null => String::new(),
                                other => other.to_string(),
                            })
                        })
                        .collect(),
                ),
                DType::String,
            ),
        };

        if rejected > 0 {
            warn!(target: "ingest", "Column '{}': {} value(s) could not be read as {}", name, rejected, dtype);
            warnings.push(
                Diagnostic::new(
                    Component::Ingest,
                    format!("{} value(s) could not be read as {} and were set to null", rejected, dtype),
                )
                .with_subject(name.to_string()),
            );
        }
        result
    }
}

fn coerce_bool(value: &RawValue) -> Option<bool> {
    match value {
        RawValue::Bool(b) => Some(*b),
        RawValue::Str(s) => Some(s.eq_ignore_ascii_case("true")),
        RawValue::Int(i) => Some(*i != 0),
        RawValue::Float(f) => Some(*f != 0.0),
        _ => None,
    }
}

fn pad_column(data: &mut ColumnData, len: usize) {
    match data {
        ColumnData::Int32(v) => v.resize(len, None),
        ColumnData::Int64(v) => v.resize(len, None),
        ColumnData::Float32(v) => v.resize(len, None),
        ColumnData::Float64(v) => v.resize(len, None),
        ColumnData::Bool(v) => v.resize(len, None),
        ColumnData::Str(v) => v.resize(len, None),
        ColumnData::Time(v) => v.resize(len, None),
    }
}
