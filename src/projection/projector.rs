//! Walks an engine result grid into labeled records

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::dtype::ROW_KEY;
use crate::data::value::Scalar;
use crate::engine::{Engine, QueryId};
use crate::error::Result;
use crate::view::compiler::CompiledQuery;
use crate::view::config::Viewport;

/// Pseudo-column holding a pivoted row's ancestry, root first
pub const ROW_PATH: &str = "__ROW_PATH__";

/// Explicit read window. Unset bounds fall back to the view's stored
/// viewport, then to the full result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionRequest {
    pub start_row: Option<usize>,
    pub end_row: Option<usize>,
    pub start_col: Option<usize>,
    pub end_col: Option<usize>,
}

impl ProjectionRequest {
    pub fn rows(start_row: usize, end_row: usize) -> Self {
        Self {
            start_row: Some(start_row),
            end_row: Some(end_row),
            ..Default::default()
        }
    }
}

/// One output row: optional row path plus label/value pairs in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub row_path: Option<Vec<Scalar>>,
    pub values: Vec<(String, Scalar)>,
}

impl Record {
    pub fn get(&self, label: &str) -> Option<&Scalar> {
        self.values.iter().find(|(l, _)| l == label).map(|(_, v)| v)
    }

    pub fn contains_key(&self, label: &str) -> bool {
        if label == ROW_PATH {
            return self.row_path.is_some();
        }
        self.values.iter().any(|(l, _)| l == label)
    }

    /// Keys in output order, the row path first when present
    pub fn keys(&self) -> Vec<&str> {
        let path = self.row_path.as_ref().map(|_| ROW_PATH);
        path.into_iter()
            .chain(self.values.iter().map(|(l, _)| l.as_str()))
            .collect()
    }
}

/// Resolved physical window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
}

pub struct ResultProjector<'e, E: Engine + ?Sized> {
    engine: &'e E,
}

impl<'e, E: Engine + ?Sized> ResultProjector<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Project a window of a registered query into records.
    ///
    /// Physical column 0 of a pivoted result is the row path. Column-only
    /// views hide the row path and drop the synthetic leading rows, one per
    /// column pivot.
    pub fn project(
        &self,
        query: QueryId,
        compiled: &CompiledQuery,
        viewport: Option<&Viewport>,
        request: &ProjectionRequest,
    ) -> Result<Vec<Record>> {
        let window = self.resolve_window(query, compiled, viewport, request)?;
        if window.end_col <= window.start_col || window.end_row <= window.start_row {
            return Ok(Vec::new());
        }

        let pivoted = compiled.sides.is_pivoted();
        let labels = self.column_labels(query, compiled, window.start_col, window.end_col)?;
        let width = window.end_col - window.start_col;
        let cells = self.engine.cell_slice(
            query,
            window.start_row..window.end_row,
            window.start_col..window.end_col,
        )?;

        let mut records = Vec::with_capacity(window.end_row - window.start_row);
        for (offset, row_cells) in cells.chunks(width).enumerate() {
            let row = window.start_row + offset;
            let mut record = Record::default();
            for (rel, cell) in row_cells.iter().enumerate() {
                let col = window.start_col + rel;
                if pivoted && col == 0 {
                    if !compiled.column_only {
                        let mut path = self.engine.row_path(query, row)?;
                        path.reverse();
                        record.row_path = Some(path);
                    }
                    continue;
                }
                if let Some(Some(label)) = labels.get(rel) {
                    record.values.push((label.clone(), cell.clone()));
                }
            }
            records.push(record);
        }

        if compiled.column_only {
            let synthetic = compiled.column_pivot.len().min(records.len());
            records.drain(..synthetic);
        }

        debug!(
            target: "projection",
            "Projected rows {}..{} cols {}..{} into {} records",
            window.start_row,
            window.end_row,
            window.start_col,
            window.end_col,
            records.len()
        );
        Ok(records)
    }

    fn resolve_window(
        &self,
        query: QueryId,
        compiled: &CompiledQuery,
        viewport: Option<&Viewport>,
        request: &ProjectionRequest,
    ) -> Result<Window> {
        let viewport = viewport.copied().unwrap_or_default();
        let row_count = self.engine.row_count(query)?;
        let physical_cols = self.engine.column_count(query)? + usize::from(compiled.sides.is_pivoted());

        let start_row = request.start_row.or(viewport.top).unwrap_or(0);
        let mut end_row = request
            .end_row
            .or_else(|| viewport.height.map(|h| start_row.saturating_add(h)))
            .unwrap_or(row_count);
        let start_col = request.start_col.or(viewport.left).unwrap_or(0);
        let end_col = request
            .end_col
            .or_else(|| viewport.width.map(|w| start_col.saturating_add(w)))
            .unwrap_or(physical_cols);

        if compiled.column_only {
            end_row = end_row.saturating_add(compiled.column_pivot.len());
        }

        let end_row = end_row.min(row_count);
        let end_col = end_col.min(physical_cols);
        Ok(Window {
            start_row: start_row.min(end_row),
            end_row,
            start_col: start_col.min(end_col),
            end_col,
        })
    }

    /// Labels for physical columns `start..end`; `None` for the row path
    /// column and for columns carrying the row-identity key.
    fn column_labels(
        &self,
        query: QueryId,
        compiled: &CompiledQuery,
        start: usize,
        end: usize,
    ) -> Result<Vec<Option<String>>> {
        let aggregates = compiled.aggregate_labels();
        let n = aggregates.len();
        let pivoted = compiled.sides.is_pivoted();

        (start..end)
            .map(|col| {
                if n == 0 || (pivoted && col == 0) {
                    return Ok(None);
                }
                let key = if pivoted { col - 1 } else { col };
                let name = &aggregates[key % n];
                if name == ROW_KEY {
                    return Ok(None);
                }
                if !pivoted {
                    return Ok(Some(name.clone()));
                }

                let mut segments: Vec<String> = self
                    .engine
                    .column_path(query, col)?
                    .iter()
                    .rev()
                    .map(|s| s.to_string())
                    .collect();
                segments.push(name.clone());
                Ok(Some(segments.join(",")))
            })
            .collect()
    }
}
