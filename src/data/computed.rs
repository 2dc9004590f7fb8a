//! Derived columns evaluated at ingestion
//!
//! A computed column is a function over other columns of the same row. It is
//! evaluated on every build and fill of the table that declares it, so the
//! engine only ever sees plain typed columns.

use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::data::canonicalizer::CanonicalDataset;
use crate::data::dtype::DType;
use crate::data::value::{ColumnData, Scalar};
use crate::diagnostics::{Component, Diagnostic};
use crate::error::{Result, ViewError};

pub type ComputeFn = Rc<dyn Fn(&[Scalar]) -> Scalar>;

/// A named column derived from `inputs` by `func`
#[derive(Clone)]
pub struct ComputedColumn {
    pub name: String,
    pub dtype: DType,
    pub inputs: Vec<String>,
    func: ComputeFn,
}

impl ComputedColumn {
    /// A STRING column; use [`ComputedColumn::typed`] or [`ComputedColumn::with_tag`]
    /// to store another type
    pub fn new<F>(name: impl Into<String>, inputs: &[&str], func: F) -> Self
    where
        F: Fn(&[Scalar]) -> Scalar + 'static,
    {
        Self {
            name: name.into(),
            dtype: DType::String,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            func: Rc::new(func),
        }
    }

    pub fn typed(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Type from a user-facing tag. Only "integer", "float" and "boolean"
    /// change the type; anything else stores strings.
    pub fn with_tag(self, tag: &str) -> Self {
        let dtype = match tag {
            "integer" => DType::Int32,
            "float" => DType::Float64,
            "boolean" => DType::Bool,
            _ => DType::String,
        };
        self.typed(dtype)
    }

    /// Evaluate over every row of `dataset`. Returns the column and how many
    /// results could not be stored as the column's type.
    pub fn evaluate(&self, dataset: &CanonicalDataset) -> Result<(ColumnData, usize)> {
        let inputs = self
            .inputs
            .iter()
            .map(|input| {
                dataset.column(input).ok_or_else(|| ViewError::UnknownColumn {
                    column: input.clone(),
                    context: format!("computed column '{}'", self.name),
                })
            })
            .collect::<Result<Vec<&ColumnData>>>()?;

        let mut args = Vec::with_capacity(inputs.len());
        let results = (0..dataset.row_count).map(|row| {
            args.clear();
            args.extend(inputs.iter().map(|col| col.get(row)));
            (self.func)(&args)
        });
        Ok(ColumnData::from_scalars(self.dtype, results))
    }
}

impl fmt::Debug for ComputedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedColumn")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl CanonicalDataset {
    /// Evaluate `computed` in order and append each result as a column.
    /// Later definitions may read columns added by earlier ones.
    pub fn attach_computed(&mut self, computed: &[ComputedColumn]) -> Result<()> {
        for column in computed {
            let (data, rejected) = column.evaluate(self)?;
            if rejected > 0 {
                warn!(
                    target: "ingest",
                    "Computed column '{}': {} value(s) could not be stored as {}",
                    column.name, rejected, column.dtype
                );
                self.warnings.push(
                    Diagnostic::new(
                        Component::Ingest,
                        format!(
                            "{} computed value(s) could not be stored as {} and were set to null",
                            rejected, column.dtype
                        ),
                    )
                    .with_subject(column.name.clone()),
                );
            }
            self.names.push(column.name.clone());
            self.types.push(column.dtype);
            self.columns.push(data);
        }

        if !computed.is_empty() {
            self.schema()?;
            debug!(target: "ingest", "Attached {} computed column(s)", computed.len());
        }
        Ok(())
    }
}
