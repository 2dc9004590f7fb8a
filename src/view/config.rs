//! User-facing view configuration
//!
//! Deserializes from the JSON form callers already use:
//!
//! ```json
//! {
//!   "row_pivot": ["region"],
//!   "column_pivot": ["year"],
//!   "aggregate": [{"op": "sum", "column": "sales"}],
//!   "filter": [["sales", ">", 100]],
//!   "sort": [["sales", "desc"]]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::data::value::Scalar;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub row_pivot: Vec<String>,
    pub column_pivot: Vec<String>,
    /// `None` asks for one default aggregate per column; an empty list means none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Vec<AggregateSpec>>,
    pub filter: Vec<FilterSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_op: Option<String>,
    pub sort: Vec<SortSpec>,
    /// 1-based; absent means fully expanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_pivot_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_pivot_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl ViewConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Either a single column or an explicit dependency list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    One(String),
    Many(Vec<String>),
}

impl ColumnRef {
    pub fn columns(&self) -> Vec<String> {
        match self {
            ColumnRef::One(column) => vec![column.clone()],
            ColumnRef::Many(columns) => columns.clone(),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(column: &str) -> Self {
        ColumnRef::One(column.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub op: String,
    pub column: ColumnRef,
}

impl AggregateSpec {
    pub fn new(op: &str, column: impl Into<ColumnRef>) -> Self {
        Self {
            name: None,
            op: op.to_string(),
            column: column.into(),
        }
    }

    pub fn with_columns(op: &str, columns: &[&str]) -> Self {
        Self::new(op, ColumnRef::Many(columns.iter().map(|c| c.to_string()).collect()))
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Right-hand side of a filter term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Many(Vec<Scalar>),
    One(Scalar),
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::One(Scalar::Null)
    }
}

/// A `(column, op, value)` filter term; the value may be omitted for unary ops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FilterTuple", into = "FilterTuple")]
pub struct FilterSpec {
    pub column: String,
    pub op: String,
    pub value: FilterValue,
}

impl FilterSpec {
    pub fn new(column: &str, op: &str, value: impl Into<Scalar>) -> Self {
        Self {
            column: column.to_string(),
            op: op.to_string(),
            value: FilterValue::One(value.into()),
        }
    }

    pub fn set(column: &str, op: &str, values: Vec<Scalar>) -> Self {
        Self {
            column: column.to_string(),
            op: op.to_string(),
            value: FilterValue::Many(values),
        }
    }

    pub fn unary(column: &str, op: &str) -> Self {
        Self {
            column: column.to_string(),
            op: op.to_string(),
            value: FilterValue::default(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FilterTuple {
    Binary(String, String, FilterValue),
    Unary(String, String),
}

impl From<FilterTuple> for FilterSpec {
    fn from(tuple: FilterTuple) -> Self {
        match tuple {
            FilterTuple::Binary(column, op, value) => Self { column, op, value },
            FilterTuple::Unary(column, op) => Self {
                column,
                op,
                value: FilterValue::default(),
            },
        }
    }
}

impl From<FilterSpec> for FilterTuple {
    fn from(spec: FilterSpec) -> Self {
        FilterTuple::Binary(spec.column, spec.op, spec.value)
    }
}

/// A bare column name (ascending) or a `(column, direction)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Column(String),
    Directed(String, String),
}

impl SortSpec {
    pub fn new(column: &str, direction: &str) -> Self {
        SortSpec::Directed(column.to_string(), direction.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            SortSpec::Column(column) | SortSpec::Directed(column, _) => column,
        }
    }

    pub fn direction(&self) -> Option<&str> {
        match self {
            SortSpec::Column(_) => None,
            SortSpec::Directed(_, direction) => Some(direction),
        }
    }
}

impl From<&str> for SortSpec {
    fn from(column: &str) -> Self {
        SortSpec::Column(column.to_string())
    }
}

/// Stored default read window for a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub top: Option<usize>,
    pub left: Option<usize>,
    pub height: Option<usize>,
    pub width: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ViewConfig::from_json(
            r#"{
                "row_pivot": ["region"],
                "column_pivot": ["year"],
                "aggregate": [
                    {"op": "sum", "column": "sales"},
                    {"name": "wm", "op": "weighted mean", "column": ["price", "qty"]}
                ],
                "filter": [["sales", ">", 100], ["region", "in", ["EU", "US"]], ["price", "is nan"]],
                "filter_op": "or",
                "sort": ["sales", ["qty", "desc"]],
                "row_pivot_depth": 1,
                "viewport": {"top": 10, "height": 5}
            }"#,
        )
        .unwrap();

        assert_eq!(config.row_pivot, vec!["region"]);
        let aggregates = config.aggregate.as_ref().unwrap();
        assert_eq!(aggregates[0], AggregateSpec::new("sum", "sales"));
        assert_eq!(aggregates[1].name.as_deref(), Some("wm"));
        assert_eq!(aggregates[1].column.columns(), vec!["price", "qty"]);

        assert_eq!(config.filter[0], FilterSpec::new("sales", ">", 100i64));
        assert_eq!(
            config.filter[1].value,
            FilterValue::Many(vec![Scalar::from("EU"), Scalar::from("US")])
        );
        assert_eq!(config.filter[2], FilterSpec::unary("price", "is nan"));
        assert_eq!(config.filter_op.as_deref(), Some("or"));

        assert_eq!(config.sort[0], SortSpec::from("sales"));
        assert_eq!(config.sort[1].direction(), Some("desc"));
        assert_eq!(config.row_pivot_depth, Some(1));
        assert_eq!(config.column_pivot_depth, None);
        assert_eq!(config.viewport.unwrap().top, Some(10));
        assert_eq!(config.viewport.unwrap().width, None);
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = ViewConfig::from_json("{}").unwrap();
        assert_eq!(config, ViewConfig::default());
        assert!(config.aggregate.is_none());

        let none = ViewConfig::from_json(r#"{"aggregate": []}"#).unwrap();
        assert_eq!(none.aggregate, Some(vec![]));
    }

    #[test]
    fn test_filter_serializes_as_tuple() {
        let json = serde_json::to_string(&FilterSpec::new("a", "==", "x")).unwrap();
        assert_eq!(json, r#"["a","==","x"]"#);
    }
}
