//! Scripted in-memory engine shared by the integration tests
//!
//! Flat (0-sided) queries are answered from the stored table rows, one
//! column per aggregate label. Pivoted queries read from a `Grid` scripted
//! ahead of registration with `FakeEngine::script_grid`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::ops::Range;

use pivot_view::view::SortEntry;
use pivot_view::{
    CanonicalDataset, CellDelta, ColumnData, ColumnSchema, CompiledQuery, DType, Engine, Header, QueryId, Result,
    Scalar, Sides, TableBuild, TableId, ViewError,
};

/// A pivoted result grid. Physical column 0 is the row path placeholder.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    pub cells: Vec<Vec<Scalar>>,
    /// Leaf first, one per physical row
    pub row_paths: Vec<Vec<Scalar>>,
    /// Leaf first, indexed by physical column
    pub column_paths: Vec<Vec<Scalar>>,
    pub row_depths: Vec<usize>,
    pub data_columns: usize,
}

impl Grid {
    /// `data` rows hold data columns only; the placeholder column is added here
    pub fn pivoted(data: Vec<Vec<Scalar>>, row_paths: Vec<Vec<Scalar>>, column_paths: Vec<Vec<Scalar>>) -> Self {
        let data_columns = data.first().map(|r| r.len()).unwrap_or(column_paths.len());
        let cells = data
            .into_iter()
            .map(|row| std::iter::once(Scalar::Null).chain(row).collect())
            .collect();
        let row_depths = row_paths.iter().map(|p| p.len()).collect();
        let column_paths = std::iter::once(Vec::new()).chain(column_paths).collect();
        Self {
            cells,
            row_paths,
            column_paths,
            row_depths,
            data_columns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub names: Vec<String>,
    pub types: Vec<DType>,
    pub rows: Vec<Vec<Scalar>>,
    pub index: Option<String>,
}

impl FakeTable {
    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[derive(Debug, Clone)]
pub struct FakeQuery {
    pub table: TableId,
    pub compiled: CompiledQuery,
    pub grid: Option<Grid>,
    pub registered_sort: Vec<SortEntry>,
    pub applied_sort: Option<Vec<SortEntry>>,
    pub expansions: Vec<(Header, usize)>,
    pub collapses: Vec<(Header, usize)>,
    pub opened: Vec<usize>,
    pub closed: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct FillLog {
    pub table: TableId,
    pub rows: usize,
    pub existing_size: usize,
    pub is_delete: bool,
    pub is_arrow: bool,
    pub index: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeEngine {
    pub tables: HashMap<TableId, FakeTable>,
    pub queries: HashMap<QueryId, FakeQuery>,
    pub fills: Vec<FillLog>,
    pub deleted_queries: Vec<QueryId>,
    pub supports_step_delta: bool,
    next_query: u64,
    grids: VecDeque<Grid>,
    deltas: VecDeque<Vec<CellDelta>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_delta() -> Self {
        Self {
            supports_step_delta: true,
            ..Self::default()
        }
    }

    /// Grid served to the next registered pivoted query
    pub fn script_grid(&mut self, grid: Grid) {
        self.grids.push_back(grid);
    }

    /// Delta returned by the next `step_delta` call
    pub fn script_delta(&mut self, cells: Vec<CellDelta>) {
        self.deltas.push_back(cells);
    }

    pub fn query(&self, query: QueryId) -> &FakeQuery {
        &self.queries[&query]
    }

    pub fn only_query(&self) -> &FakeQuery {
        assert_eq!(self.queries.len(), 1, "expected exactly one registered query");
        self.queries.values().next().unwrap()
    }

    fn get_table(&self, table: TableId) -> Result<&FakeTable> {
        self.tables
            .get(&table)
            .ok_or_else(|| ViewError::Engine(format!("no such table {}", table)))
    }

    fn get_query(&self, query: QueryId) -> Result<&FakeQuery> {
        self.queries
            .get(&query)
            .ok_or_else(|| ViewError::Engine(format!("no such query {}", query)))
    }

    fn get_query_mut(&mut self, query: QueryId) -> Result<&mut FakeQuery> {
        self.queries
            .get_mut(&query)
            .ok_or_else(|| ViewError::Engine(format!("no such query {}", query)))
    }

    fn dataset_rows(build: &TableBuild<'_>) -> Vec<Vec<Scalar>> {
        let dataset = build.dataset;
        (0..dataset.row_count)
            .map(|r| dataset.columns.iter().map(|c| c.get(r)).collect())
            .collect()
    }

    fn log_fill(&mut self, table: TableId, build: &TableBuild<'_>) {
        self.fills.push(FillLog {
            table,
            rows: build.dataset.row_count,
            existing_size: build.existing_size,
            is_delete: build.is_delete,
            is_arrow: build.is_arrow(),
            index: build.index.map(str::to_string),
        });
    }
}

impl Engine for FakeEngine {
    fn create_table(&mut self, table: TableId, build: &TableBuild<'_>) -> Result<()> {
        self.log_fill(table, build);
        self.tables.insert(
            table,
            FakeTable {
                names: build.dataset.names.clone(),
                types: build.dataset.types.clone(),
                rows: Self::dataset_rows(build),
                index: build.index.map(str::to_string),
            },
        );
        Ok(())
    }

    fn fill_table(&mut self, table: TableId, build: &TableBuild<'_>) -> Result<()> {
        self.log_fill(table, build);
        let incoming = Self::dataset_rows(build);
        let names = build.dataset.names.clone();
        let state = self
            .tables
            .get_mut(&table)
            .ok_or_else(|| ViewError::Engine(format!("no such table {}", table)))?;

        let key_of = |state: &FakeTable, row: &[Scalar], names: &[String]| -> Option<Scalar> {
            let index = state.index.as_ref()?;
            let pos = names.iter().position(|n| n == index)?;
            row.get(pos).cloned()
        };

        for row in incoming {
            let key = key_of(state, &row, &names);
            let existing = key.as_ref().and_then(|key| {
                let idx = state.position(state.index.as_deref()?)?;
                state.rows.iter().position(|r| r.get(idx) == Some(key))
            });

            if build.is_delete {
                if let Some(pos) = existing {
                    state.rows.remove(pos);
                }
                continue;
            }

            let mut full = vec![Scalar::Null; state.names.len()];
            for (name, value) in names.iter().zip(row) {
                if let Some(pos) = state.position(name) {
                    full[pos] = value;
                }
            }
            match existing {
                Some(pos) => state.rows[pos] = full,
                None => state.rows.push(full),
            }
        }
        Ok(())
    }

    fn table_schema(&self, table: TableId) -> Result<ColumnSchema> {
        let state = self.get_table(table)?;
        ColumnSchema::from_parts(&state.names, &state.types)
    }

    fn table_size(&self, table: TableId) -> Result<usize> {
        Ok(self.get_table(table)?.rows.len())
    }

    fn snapshot(&self, table: TableId) -> Result<CanonicalDataset> {
        let state = self.get_table(table)?;
        let columns = state
            .types
            .iter()
            .enumerate()
            .map(|(c, dtype)| {
                let values = state.rows.iter().map(|row| row[c].clone());
                ColumnData::from_scalars(*dtype, values).0
            })
            .collect();
        Ok(CanonicalDataset {
            row_count: state.rows.len(),
            names: state.names.clone(),
            types: state.types.clone(),
            columns,
            is_arrow: false,
            warnings: Vec::new(),
        })
    }

    fn delete_table(&mut self, table: TableId) -> Result<()> {
        self.tables
            .remove(&table)
            .map(|_| ())
            .ok_or_else(|| ViewError::Engine(format!("no such table {}", table)))
    }

    fn register_query(&mut self, table: TableId, query: &CompiledQuery) -> Result<QueryId> {
        self.get_table(table)?;
        self.next_query += 1;
        let id = QueryId(self.next_query);
        let grid = if query.sides == Sides::Zero {
            None
        } else {
            self.grids.pop_front()
        };
        self.queries.insert(
            id,
            FakeQuery {
                table,
                compiled: query.clone(),
                grid,
                registered_sort: query.registration_sort().to_vec(),
                applied_sort: None,
                expansions: Vec::new(),
                collapses: Vec::new(),
                opened: Vec::new(),
                closed: Vec::new(),
            },
        );
        Ok(id)
    }

    fn delete_query(&mut self, query: QueryId) -> Result<()> {
        self.queries
            .remove(&query)
            .ok_or_else(|| ViewError::Engine(format!("no such query {}", query)))?;
        self.deleted_queries.push(query);
        Ok(())
    }

    fn expand_to_depth(&mut self, query: QueryId, header: Header, depth: usize) -> Result<()> {
        self.get_query_mut(query)?.expansions.push((header, depth));
        Ok(())
    }

    fn collapse_to_depth(&mut self, query: QueryId, header: Header, depth: usize) -> Result<()> {
        self.get_query_mut(query)?.collapses.push((header, depth));
        Ok(())
    }

    fn apply_sort(&mut self, query: QueryId, sort: &[SortEntry]) -> Result<()> {
        self.get_query_mut(query)?.applied_sort = Some(sort.to_vec());
        Ok(())
    }

    fn row_count(&self, query: QueryId) -> Result<usize> {
        let q = self.get_query(query)?;
        match &q.grid {
            Some(grid) => Ok(grid.cells.len()),
            None => Ok(self.get_table(q.table)?.rows.len()),
        }
    }

    fn column_count(&self, query: QueryId) -> Result<usize> {
        let q = self.get_query(query)?;
        match &q.grid {
            Some(grid) => Ok(grid.data_columns),
            None => Ok(q.compiled.aggregates.len()),
        }
    }

    fn cell_slice(&self, query: QueryId, rows: Range<usize>, cols: Range<usize>) -> Result<Vec<Scalar>> {
        let q = self.get_query(query)?;
        let mut out = Vec::with_capacity(rows.len() * cols.len());
        match &q.grid {
            Some(grid) => {
                for r in rows {
                    for c in cols.clone() {
                        let cell = grid
                            .cells
                            .get(r)
                            .and_then(|row| row.get(c))
                            .ok_or_else(|| ViewError::Engine(format!("cell ({}, {}) out of range", r, c)))?;
                        out.push(cell.clone());
                    }
                }
            }
            None => {
                let table = self.get_table(q.table)?;
                for r in rows {
                    let row = table
                        .rows
                        .get(r)
                        .ok_or_else(|| ViewError::Engine(format!("row {} out of range", r)))?;
                    for c in cols.clone() {
                        let label = &q.compiled.aggregates[c].columns[0];
                        let value = table.position(label).map(|p| row[p].clone()).unwrap_or(Scalar::Null);
                        out.push(value);
                    }
                }
            }
        }
        Ok(out)
    }

    fn row_path(&self, query: QueryId, row: usize) -> Result<Vec<Scalar>> {
        let q = self.get_query(query)?;
        Ok(q.grid
            .as_ref()
            .and_then(|g| g.row_paths.get(row).cloned())
            .unwrap_or_default())
    }

    fn column_path(&self, query: QueryId, col: usize) -> Result<Vec<Scalar>> {
        let q = self.get_query(query)?;
        Ok(q.grid
            .as_ref()
            .and_then(|g| g.column_paths.get(col).cloned())
            .unwrap_or_default())
    }

    fn row_depth(&self, query: QueryId, row: usize) -> Result<usize> {
        let q = self.get_query(query)?;
        Ok(q.grid
            .as_ref()
            .and_then(|g| g.row_depths.get(row).copied())
            .unwrap_or(0))
    }

    fn row_expanded(&self, query: QueryId, row: usize) -> Result<bool> {
        let q = self.get_query(query)?;
        Ok(q.opened.contains(&row) && !q.closed.contains(&row))
    }

    fn open(&mut self, query: QueryId, _header: Header, row: usize) -> Result<()> {
        self.get_query_mut(query)?.opened.push(row);
        Ok(())
    }

    fn close(&mut self, query: QueryId, _header: Header, row: usize) -> Result<()> {
        self.get_query_mut(query)?.closed.push(row);
        Ok(())
    }

    fn step_delta(&mut self, query: QueryId, _rows: Range<usize>) -> Result<Option<Vec<CellDelta>>> {
        self.get_query(query)?;
        if !self.supports_step_delta {
            return Ok(None);
        }
        Ok(Some(self.deltas.pop_front().unwrap_or_default()))
    }
}

pub fn s(value: &str) -> Scalar {
    Scalar::from(value)
}

pub fn trades_json() -> serde_json::Value {
    serde_json::json!([
        {"id": 1, "region": "EU", "product": "bolt", "qty": 5, "price": 2.5, "trade_date": "2024-01-15"},
        {"id": 2, "region": "US", "product": "nut", "qty": 7, "price": 1.25, "trade_date": "2024-01-16"},
        {"id": 3, "region": "EU", "product": "nut", "qty": 2, "price": 1.5, "trade_date": "2024-01-17"},
        {"id": 4, "region": "APAC", "product": "bolt", "qty": 9, "price": 2.75, "trade_date": "2024-01-18"}
    ])
}
