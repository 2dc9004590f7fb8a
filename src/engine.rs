//! Engine capability trait
//!
//! The aggregation/pivot engine is an external collaborator. Everything this
//! crate needs from it is expressed by [`Engine`], which is injected into the
//! session and projector rather than read from process-wide state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::data::canonicalizer::CanonicalDataset;
use crate::data::dtype::ColumnSchema;
use crate::data::value::Scalar;
use crate::error::Result;
use crate::view::compiler::{CompiledQuery, SortEntry};

macro_rules! handle_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_id!(TableId, "table");
handle_id!(ViewId, "view");
handle_id!(QueryId, "query");
handle_id!(SubscriptionId, "subscription");

/// Which pivot header an expansion call addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Header {
    Row,
    Column,
}

/// One changed cell reported by the engine's step delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellDelta {
    pub row: usize,
    pub col: usize,
}

impl CellDelta {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Arguments for a table build or fill
#[derive(Debug, Clone, Copy)]
pub struct TableBuild<'a> {
    pub dataset: &'a CanonicalDataset,
    /// Rows already in the table before this fill
    pub existing_size: usize,
    pub index: Option<&'a str>,
    /// Rows in the dataset identify rows to delete
    pub is_delete: bool,
}

impl<'a> TableBuild<'a> {
    pub fn new(dataset: &'a CanonicalDataset) -> Self {
        Self {
            dataset,
            existing_size: 0,
            index: None,
            is_delete: false,
        }
    }

    pub fn with_index(mut self, index: Option<&'a str>) -> Self {
        self.index = index;
        self
    }

    pub fn with_existing_size(mut self, existing_size: usize) -> Self {
        self.existing_size = existing_size;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.is_delete = true;
        self
    }

    /// Set when the data came from a columnar buffer and may be filled zero-copy
    pub fn is_arrow(&self) -> bool {
        self.dataset.is_arrow
    }
}

/// Core trait for the external aggregation engine
///
/// Row and column indices are physical positions in the engine's result grid.
/// For pivoted queries physical column 0 is reserved for the row path and the
/// data columns start at 1.
pub trait Engine {
    /// Build a new table from a canonical dataset
    fn create_table(&mut self, table: TableId, build: &TableBuild<'_>) -> Result<()>;

    /// Add, update or (with `is_delete`) remove rows of an existing table
    fn fill_table(&mut self, table: TableId, build: &TableBuild<'_>) -> Result<()>;

    /// Current schema, possibly including the internal row-identity key
    fn table_schema(&self, table: TableId) -> Result<ColumnSchema>;

    fn table_size(&self, table: TableId) -> Result<usize>;

    /// Current contents in schema order. Used to rebuild a table with extra
    /// computed columns.
    fn snapshot(&self, table: TableId) -> Result<CanonicalDataset>;

    fn delete_table(&mut self, table: TableId) -> Result<()>;

    /// Register a compiled query against a table. Two-sided queries carry no
    /// sort at registration; see [`CompiledQuery::registration_sort`].
    fn register_query(&mut self, table: TableId, query: &CompiledQuery) -> Result<QueryId>;

    fn delete_query(&mut self, query: QueryId) -> Result<()>;

    /// Expand a pivot header to a 0-based depth
    fn expand_to_depth(&mut self, query: QueryId, header: Header, depth: usize) -> Result<()>;

    fn collapse_to_depth(&mut self, query: QueryId, header: Header, depth: usize) -> Result<()>;

    fn apply_sort(&mut self, query: QueryId, sort: &[SortEntry]) -> Result<()>;

    fn row_count(&self, query: QueryId) -> Result<usize>;

    /// Number of data columns, excluding the row path column
    fn column_count(&self, query: QueryId) -> Result<usize>;

    /// Cells for a physical window in row-major order
    fn cell_slice(&self, query: QueryId, rows: Range<usize>, cols: Range<usize>) -> Result<Vec<Scalar>>;

    /// Pivot ancestry of a row, leaf first
    fn row_path(&self, query: QueryId, row: usize) -> Result<Vec<Scalar>>;

    /// Column-pivot ancestry of a physical column, leaf first
    fn column_path(&self, query: QueryId, col: usize) -> Result<Vec<Scalar>>;

    fn row_depth(&self, query: QueryId, row: usize) -> Result<usize>;

    fn row_expanded(&self, query: QueryId, row: usize) -> Result<bool>;

    fn open(&mut self, query: QueryId, header: Header, row: usize) -> Result<()>;

    fn close(&mut self, query: QueryId, header: Header, row: usize) -> Result<()>;

    /// Cells changed since the last call. `None` means the engine has no
    /// step-delta support; an empty list means the change could not be
    /// narrowed to individual rows.
    fn step_delta(&mut self, _query: QueryId, _rows: Range<usize>) -> Result<Option<Vec<CellDelta>>> {
        Ok(None)
    }
}
