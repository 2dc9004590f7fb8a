use std::fmt;
use thiserror::Error;

use crate::engine::{TableId, ViewId};

/// Which lookup table an operator string failed to resolve against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Filter,
    Combinator,
    Aggregate,
    SortDirection,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatorKind::Filter => "filter",
            OperatorKind::Combinator => "filter combinator",
            OperatorKind::Aggregate => "aggregate",
            OperatorKind::SortDirection => "sort direction",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("Unsupported input shape: {found}")]
    UnsupportedShape { found: String },

    #[error("Cannot infer column types from an empty row list without a schema")]
    EmptyUntypedInput,

    #[error("Unknown type '{tag}' for column '{column}'")]
    UnknownTypeTag { column: String, tag: String },

    #[error("Unknown {kind} operator '{op}'")]
    UnknownOperator { kind: OperatorKind, op: String },

    #[error("'{op}' on '{label}' needs {expected} column dependencies but got {observed}")]
    InvalidAggregateArity {
        label: String,
        op: String,
        expected: usize,
        observed: usize,
    },

    #[error("Filter '{op}' on '{column}' expects {expected}")]
    InvalidFilterOperand {
        column: String,
        op: String,
        expected: &'static str,
    },

    #[error("Specified index '{index}' does not exist in data (columns: {})", available.join(", "))]
    IndexMismatch {
        index: String,
        available: Vec<String>,
    },

    #[error("Table {table} still has {live_views} live view(s) - refusing to delete")]
    ViewTeardownRefused { table: TableId, live_views: usize },

    #[error("Column '{column}' referenced by {context} does not exist")]
    UnknownColumn { column: String, context: String },

    #[error("Duplicate column name '{name}'")]
    DuplicateColumn { name: String },

    #[error("Columnar decode error: {0}")]
    Decode(String),

    #[error("Unknown table {0}")]
    UnknownTable(TableId),

    #[error("Unknown view {0}")]
    UnknownView(ViewId),

    #[error("Table {0} has no index column; rows cannot be removed by key")]
    NoIndex(TableId),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_detail() {
        let err = ViewError::InvalidAggregateArity {
            label: "a".to_string(),
            op: "weighted mean".to_string(),
            expected: 2,
            observed: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("weighted mean"));
        assert!(msg.contains("needs 2"));
        assert!(msg.contains("got 1"));

        let err = ViewError::UnknownOperator {
            kind: OperatorKind::Filter,
            op: "~=".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown filter operator '~='");

        let err = ViewError::IndexMismatch {
            index: "id".to_string(),
            available: vec!["x".to_string(), "y".to_string()],
        };
        assert!(err.to_string().contains("x, y"));
    }
}
