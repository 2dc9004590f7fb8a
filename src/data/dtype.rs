use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, ViewError};

/// Name of the synthetic row-identity column the engine keys rows by.
/// It never appears in user-facing schemas or labels.
pub const ROW_KEY: &str = "__ROW_KEY__";

/// Storage type of a canonical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
    /// Epoch milliseconds. Conversion happens at ingestion, never later.
    Time,
}

impl DType {
    /// Parse a schema-only type tag ("integer", "float", ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "integer" => Some(DType::Int32),
            "float" => Some(DType::Float64),
            "string" => Some(DType::String),
            "boolean" => Some(DType::Bool),
            "date" => Some(DType::Time),
            _ => None,
        }
    }

    /// The user-facing tag reported by schema queries
    pub fn tag(&self) -> &'static str {
        match self {
            DType::Int32 | DType::Int64 => "integer",
            DType::Float32 | DType::Float64 => "float",
            DType::Bool => "boolean",
            DType::String => "string",
            DType::Time => "date",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DType::Int32 | DType::Int64 | DType::Float32 | DType::Float64
        )
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int32 => "INT32",
            DType::Int64 => "INT64",
            DType::Float32 => "FLOAT32",
            DType::Float64 => "FLOAT64",
            DType::Bool => "BOOL",
            DType::String => "STRING",
            DType::Time => "TIME",
        };
        f.write_str(name)
    }
}

/// One named, typed column of a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub dtype: DType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Ordered column schema. Position defines the column index used everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    columns: Vec<ColumnDef>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ViewError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Zip parallel name and type lists. Extra entries on either side are ignored.
    pub fn from_parts(names: &[String], types: &[DType]) -> Result<Self> {
        Self::new(
            names
                .iter()
                .zip(types.iter())
                .map(|(name, dtype)| ColumnDef::new(name.clone(), *dtype))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn types(&self) -> Vec<DType> {
        self.columns.iter().map(|c| c.dtype).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn dtype_of(&self, name: &str) -> Option<DType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.dtype)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Copy of this schema without the synthetic row-identity column
    pub fn without_row_key(&self) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != ROW_KEY)
                .cloned()
                .collect(),
        }
    }

    /// Restrict to the named columns, in the order given. Unknown names are skipped.
    pub fn select(&self, names: &[String]) -> Self {
        Self {
            columns: names
                .iter()
                .filter_map(|n| self.columns.iter().find(|c| &c.name == n).cloned())
                .collect(),
        }
    }
}
