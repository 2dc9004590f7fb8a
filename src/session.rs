//! Table and view lifecycle over an injected engine
//!
//! A `Session` owns the engine handle, ingestion collaborators, and the
//! registries that tie views to tables and callbacks to views. Registries are
//! keyed by stable ids; removal is by id.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::canonicalizer::{CanonicalDataset, Canonicalizer};
use crate::data::columnar_decoder::ColumnarDecoder;
use crate::data::computed::ComputedColumn;
use crate::data::csv_input::parse_csv;
use crate::data::date_parser::{ChronoDateParser, DateParser};
use crate::data::dtype::{ColumnDef, ColumnSchema, DType, ROW_KEY};
use crate::data::value::RawValue;
use crate::diagnostics::{Component, Diagnostic, DiagnosticLog};
use crate::engine::{Engine, Header, QueryId, SubscriptionId, TableBuild, TableId, ViewId};
use crate::error::{Result, ViewError};
use crate::projection::delta::UpdatePlan;
use crate::projection::formatter::{to_csv_string, to_json_value};
use crate::projection::projector::{ProjectionRequest, Record, ResultProjector};
use crate::trace_lifecycle;
use crate::view::compiler::{CompiledQuery, Sides, ViewQueryCompiler};
use crate::view::config::ViewConfig;

pub type UpdateCallback = Box<dyn FnMut(&[Record])>;
pub type DeleteCallback = Box<dyn FnMut()>;

struct TableState {
    index: Option<String>,
    /// Re-evaluated on every fill
    computed: Vec<ComputedColumn>,
    views: BTreeSet<ViewId>,
    on_delete: Vec<DeleteCallback>,
}

struct ViewState {
    table: TableId,
    query: QueryId,
    config: ViewConfig,
    compiled: CompiledQuery,
    on_delete: Vec<DeleteCallback>,
}

struct Subscription {
    view: ViewId,
    table: TableId,
    callback: UpdateCallback,
}

pub struct Session<E: Engine> {
    engine: E,
    parser: Box<dyn DateParser>,
    decoder: Option<Box<dyn ColumnarDecoder>>,
    config: Config,
    diagnostics: DiagnosticLog,
    tables: BTreeMap<TableId, TableState>,
    views: BTreeMap<ViewId, ViewState>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_id: u64,
}

/// Strip the engine's row-identity column from a snapshot
fn drop_row_key(dataset: &mut CanonicalDataset) {
    if let Some(pos) = dataset.names.iter().position(|n| n == ROW_KEY) {
        dataset.names.remove(pos);
        dataset.types.remove(pos);
        dataset.columns.remove(pos);
    }
}

impl<E: Engine> Session<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, Config::default())
    }

    pub fn with_config(engine: E, config: Config) -> Self {
        let diagnostics = DiagnosticLog::with_capacity(config.diagnostics.capacity);
        Self {
            engine,
            parser: Box::new(ChronoDateParser::new()),
            decoder: None,
            config,
            diagnostics,
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn with_date_parser(mut self, parser: Box<dyn DateParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn ColumnarDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn canonicalize(&self, raw: &RawValue, prior: Option<&ColumnSchema>) -> Result<CanonicalDataset> {
        let mut canonicalizer = Canonicalizer::new(self.parser.as_ref()).with_config(&self.config.ingest);
        if let Some(decoder) = &self.decoder {
            canonicalizer = canonicalizer.with_decoder(decoder.as_ref());
        }
        let dataset = canonicalizer.canonicalize(raw, prior)?;
        self.diagnostics.extend(dataset.warnings.iter().cloned());
        Ok(dataset)
    }

    fn table(&self, table: TableId) -> Result<&TableState> {
        self.tables.get(&table).ok_or(ViewError::UnknownTable(table))
    }

    fn view(&self, view: ViewId) -> Result<&ViewState> {
        self.views.get(&view).ok_or(ViewError::UnknownView(view))
    }

    // ---- tables ----

    pub fn create_table(&mut self, raw: &RawValue, index: Option<&str>) -> Result<TableId> {
        self.create_table_with_computed(raw, index, Vec::new())
    }

    /// Create a table whose computed columns are evaluated now and on every
    /// later update
    pub fn create_table_with_computed(
        &mut self,
        raw: &RawValue,
        index: Option<&str>,
        computed: Vec<ComputedColumn>,
    ) -> Result<TableId> {
        let mut dataset = self.canonicalize(raw, None)?;
        self.attach_computed(&mut dataset, &computed)?;
        self.build_table(&dataset, index, computed)
    }

    /// A new table holding this table's rows plus `computed`. The new table
    /// keeps the index and the earlier computed definitions; the source table
    /// is left as it is.
    pub fn add_computed(&mut self, table: TableId, computed: Vec<ComputedColumn>) -> Result<TableId> {
        let state = self.table(table)?;
        let index = state.index.clone();
        let mut merged = state.computed.clone();

        let mut dataset = self.engine.snapshot(table)?;
        drop_row_key(&mut dataset);
        self.attach_computed(&mut dataset, &computed)?;
        merged.extend(computed);

        let derived = self.build_table(&dataset, index.as_deref(), merged)?;
        debug!(target: "session", "Derived {} from {} with computed columns", derived, table);
        Ok(derived)
    }

    fn attach_computed(&self, dataset: &mut CanonicalDataset, computed: &[ComputedColumn]) -> Result<()> {
        let seen = dataset.warnings.len();
        dataset.attach_computed(computed)?;
        self.diagnostics.extend(dataset.warnings[seen..].iter().cloned());
        Ok(())
    }

    fn build_table(
        &mut self,
        dataset: &CanonicalDataset,
        index: Option<&str>,
        computed: Vec<ComputedColumn>,
    ) -> Result<TableId> {
        if let Some(index) = index {
            if !dataset.names.iter().any(|n| n == index) {
                return Err(ViewError::IndexMismatch {
                    index: index.to_string(),
                    available: dataset.names.clone(),
                });
            }
        }

        let table = TableId(self.next_id());
        let build = TableBuild::new(dataset).with_index(index);
        self.engine.create_table(table, &build)?;
        self.tables.insert(
            table,
            TableState {
                index: index.map(str::to_string),
                computed,
                views: BTreeSet::new(),
                on_delete: Vec::new(),
            },
        );

        info!(
            target: "session",
            "Created {} with {} rows x {} columns",
            table,
            dataset.row_count,
            dataset.column_count()
        );
        Ok(table)
    }

    pub fn create_table_from_csv(&mut self, text: &str, index: Option<&str>) -> Result<TableId> {
        let raw = parse_csv(text)?;
        self.create_table(&raw, index)
    }

    /// Add or update rows. The table's current schema is authoritative and
    /// computed columns are re-evaluated over the incoming rows.
    pub fn update(&mut self, table: TableId, raw: &RawValue) -> Result<()> {
        let state = self.table(table)?;
        let index = state.index.clone();
        let computed = state.computed.clone();

        let schema = self.table_schema(table)?;
        let stored: Vec<String> = schema
            .names()
            .into_iter()
            .filter(|name| !computed.iter().any(|c| &c.name == name))
            .collect();
        let mut dataset = self.canonicalize(raw, Some(&schema.select(&stored)))?;
        self.attach_computed(&mut dataset, &computed)?;
        let existing_size = self.engine.table_size(table)?;

        let build = TableBuild::new(&dataset)
            .with_index(index.as_deref())
            .with_existing_size(existing_size);
        self.engine.fill_table(table, &build)?;
        debug!(target: "session", "Filled {} with {} rows", table, dataset.row_count);

        self.notify_table(table);
        Ok(())
    }

    /// Remove rows by index key
    pub fn remove(&mut self, table: TableId, keys: &[RawValue]) -> Result<()> {
        let index = self.table(table)?.index.clone().ok_or(ViewError::NoIndex(table))?;
        let index_type = self
            .engine
            .table_schema(table)?
            .dtype_of(&index)
            .unwrap_or(DType::String);
        let key_schema = ColumnSchema::new(vec![ColumnDef::new(index.clone(), index_type)])?;

        let rows = keys
            .iter()
            .map(|key| RawValue::map([(index.clone(), key.clone())]))
            .collect();
        let dataset = self.canonicalize(&RawValue::List(rows), Some(&key_schema))?;
        let existing_size = self.engine.table_size(table)?;

        let build = TableBuild::new(&dataset)
            .with_index(Some(&index))
            .with_existing_size(existing_size)
            .deleting();
        self.engine.fill_table(table, &build)?;
        debug!(target: "session", "Removed {} keys from {}", keys.len(), table);

        self.notify_table(table);
        Ok(())
    }

    /// Column names and types, without the row-identity key
    pub fn table_schema(&self, table: TableId) -> Result<ColumnSchema> {
        self.table(table)?;
        Ok(self.engine.table_schema(table)?.without_row_key())
    }

    pub fn table_columns(&self, table: TableId) -> Result<Vec<String>> {
        Ok(self.table_schema(table)?.names())
    }

    pub fn table_size(&self, table: TableId) -> Result<usize> {
        self.table(table)?;
        self.engine.table_size(table)
    }

    pub fn table_index(&self, table: TableId) -> Result<Option<&str>> {
        Ok(self.table(table)?.index.as_deref())
    }

    pub fn delete_table(&mut self, table: TableId) -> Result<()> {
        let live_views = self.table(table)?.views.len();
        if live_views > 0 {
            return Err(ViewError::ViewTeardownRefused { table, live_views });
        }

        self.engine.delete_table(table)?;
        if let Some(mut state) = self.tables.remove(&table) {
            for callback in state.on_delete.iter_mut() {
                callback();
            }
        }
        trace_lifecycle!("Deleted", table);
        Ok(())
    }

    pub fn on_table_delete(&mut self, table: TableId, callback: DeleteCallback) -> Result<()> {
        self.tables
            .get_mut(&table)
            .ok_or(ViewError::UnknownTable(table))?
            .on_delete
            .push(callback);
        Ok(())
    }

    // ---- views ----

    /// Compile and register a view. Two-sided views are expanded before the
    /// sort is remapped across the realized column groups and applied.
    pub fn create_view(&mut self, table: TableId, config: ViewConfig) -> Result<ViewId> {
        self.table(table)?;
        let schema = self.engine.table_schema(table)?;
        let compiled = ViewQueryCompiler::new(self.parser.as_ref()).compile(&config, &schema)?;
        self.diagnostics.extend(compiled.warnings.iter().cloned());

        let query = self.engine.register_query(table, &compiled)?;
        match compiled.sides {
            Sides::Two => {
                self.engine.expand_to_depth(query, Header::Row, compiled.row_pivot_depth)?;
                self.engine
                    .expand_to_depth(query, Header::Column, compiled.column_pivot_depth)?;
                if !compiled.sort.is_empty() {
                    let total_columns = self.engine.column_count(query)?;
                    let sort = compiled.remap_sort_for_groups(total_columns);
                    self.engine.apply_sort(query, &sort)?;
                }
            }
            Sides::One => {
                self.engine.expand_to_depth(query, Header::Row, compiled.row_pivot_depth)?;
            }
            Sides::Zero => {}
        }

        let view = ViewId(self.next_id());
        if let Some(state) = self.tables.get_mut(&table) {
            state.views.insert(view);
        }
        self.views.insert(
            view,
            ViewState {
                table,
                query,
                config,
                compiled,
                on_delete: Vec::new(),
            },
        );
        trace_lifecycle!("Created", view);
        Ok(view)
    }

    pub fn compiled_query(&self, view: ViewId) -> Result<&CompiledQuery> {
        Ok(&self.view(view)?.compiled)
    }

    pub fn view_config(&self, view: ViewId) -> Result<&ViewConfig> {
        Ok(&self.view(view)?.config)
    }

    pub fn view_records(&self, view: ViewId, request: &ProjectionRequest) -> Result<Vec<Record>> {
        let state = self.view(view)?;
        ResultProjector::new(&self.engine).project(
            state.query,
            &state.compiled,
            state.config.viewport.as_ref(),
            request,
        )
    }

    pub fn view_to_json(&self, view: ViewId, request: &ProjectionRequest) -> Result<serde_json::Value> {
        Ok(to_json_value(&self.view_records(view, request)?))
    }

    pub fn view_to_csv(&self, view: ViewId, request: &ProjectionRequest) -> Result<String> {
        to_csv_string(&self.view_records(view, request)?, &self.config.output)
    }

    /// Leaf label to type. Count-style aggregates report an integer type on
    /// pivoted views; other aggregates report their source column's type.
    pub fn view_schema(&self, view: ViewId) -> Result<ColumnSchema> {
        let state = self.view(view)?;
        let table_schema = self.engine.table_schema(state.table)?;
        let pivoted = state.compiled.sides.is_pivoted();

        let mut columns: Vec<ColumnDef> = Vec::new();
        for aggregate in &state.compiled.aggregates {
            if aggregate.label == ROW_KEY || columns.iter().any(|c| c.name == aggregate.label) {
                continue;
            }
            let source = table_schema
                .dtype_of(&aggregate.label)
                .or_else(|| aggregate.columns.first().and_then(|c| table_schema.dtype_of(c)));
            let dtype = if pivoted && aggregate.op.is_count() {
                Some(DType::Int64)
            } else {
                source
            };
            if let Some(dtype) = dtype {
                columns.push(ColumnDef::new(aggregate.label.clone(), dtype));
            }
        }
        ColumnSchema::new(columns)
    }

    pub fn num_rows(&self, view: ViewId) -> Result<usize> {
        self.engine.row_count(self.view(view)?.query)
    }

    pub fn num_columns(&self, view: ViewId) -> Result<usize> {
        self.engine.column_count(self.view(view)?.query)
    }

    pub fn row_expanded(&self, view: ViewId, row: usize) -> Result<bool> {
        self.engine.row_expanded(self.view(view)?.query, row)
    }

    pub fn open_row(&mut self, view: ViewId, row: usize) -> Result<()> {
        let state = self.view(view)?;
        let (query, sides, depth) = (state.query, state.compiled.sides, state.compiled.row_pivot.len());
        if sides != Sides::Two || self.engine.row_depth(query, row)? < depth {
            self.engine.open(query, Header::Row, row)?;
        }
        Ok(())
    }

    pub fn close_row(&mut self, view: ViewId, row: usize) -> Result<()> {
        let query = self.view(view)?.query;
        self.engine.close(query, Header::Row, row)
    }

    pub fn expand_to_depth(&mut self, view: ViewId, depth: usize) -> Result<()> {
        self.change_depth(view, depth, true)
    }

    pub fn collapse_to_depth(&mut self, view: ViewId, depth: usize) -> Result<()> {
        self.change_depth(view, depth, false)
    }

    fn change_depth(&mut self, view: ViewId, depth: usize, expand: bool) -> Result<()> {
        let state = self.view(view)?;
        let (query, max_depth) = (state.query, state.compiled.row_pivot.len());
        let verb = if expand { "expand" } else { "collapse" };

        if depth > max_depth {
            warn!(target: "session", "Cannot {} {} past depth {}", verb, view, max_depth);
            self.diagnostics.push(
                Diagnostic::new(
                    Component::Session,
                    format!("cannot {} past depth {} (requested {})", verb, max_depth, depth),
                )
                .with_subject(view.to_string()),
            );
            return Ok(());
        }

        if expand {
            self.engine.expand_to_depth(query, Header::Row, depth)
        } else {
            self.engine.collapse_to_depth(query, Header::Row, depth)
        }
    }

    pub fn on_view_delete(&mut self, view: ViewId, callback: DeleteCallback) -> Result<()> {
        self.views
            .get_mut(&view)
            .ok_or(ViewError::UnknownView(view))?
            .on_delete
            .push(callback);
        Ok(())
    }

    pub fn delete_view(&mut self, view: ViewId) -> Result<()> {
        let query = self.view(view)?.query;
        self.engine.delete_query(query)?;

        let Some(mut state) = self.views.remove(&view) else {
            return Err(ViewError::UnknownView(view));
        };
        if let Some(table) = self.tables.get_mut(&state.table) {
            table.views.remove(&view);
        }
        self.subscriptions.retain(|_, sub| sub.view != view);
        for callback in state.on_delete.iter_mut() {
            callback();
        }
        trace_lifecycle!("Deleted", view);
        Ok(())
    }

    // ---- update notifications ----

    pub fn on_update(&mut self, view: ViewId, callback: UpdateCallback) -> Result<SubscriptionId> {
        let table = self.view(view)?.table;
        let id = SubscriptionId(self.next_id());
        self.subscriptions.insert(id, Subscription { view, table, callback });
        debug!(target: "session", "Registered {} on {}", id, view);
        Ok(id)
    }

    /// Returns whether the subscription existed
    pub fn remove_subscription(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Fire the table's subscriptions in registration order. Each callback
    /// receives the fully assembled records for its view. A subscription
    /// whose records cannot be assembled is skipped with a diagnostic; the
    /// fill has already been applied, so the others still fire.
    fn notify_table(&mut self, table: TableId) {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.table == table)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let Some(view) = self.subscriptions.get(&id).map(|sub| sub.view) else {
                continue;
            };
            let records = match self.update_records(view) {
                Ok(records) => records,
                Err(e) => {
                    warn!(target: "session", "Skipping {} on {}: {}", id, view, e);
                    self.diagnostics.push(
                        Diagnostic::new(Component::Projection, format!("update not delivered: {}", e))
                            .with_subject(view.to_string()),
                    );
                    continue;
                }
            };
            if let Some(sub) = self.subscriptions.get_mut(&id) {
                (sub.callback)(&records);
            }
        }
    }

    fn update_records(&mut self, view: ViewId) -> Result<Vec<Record>> {
        let query = self.view(view)?.query;
        let delta = self.engine.step_delta(query, 0..i32::MAX as usize)?;

        match UpdatePlan::from_delta(delta.as_deref()) {
            UpdatePlan::Unsupported => Ok(Vec::new()),
            UpdatePlan::Full => self.view_records(view, &ProjectionRequest::default()),
            UpdatePlan::Rows(rows) => {
                let mut records = Vec::new();
                for row in rows {
                    records.extend(self.view_records(view, &ProjectionRequest::rows(row, row + 1))?);
                }
                Ok(records)
            }
        }
    }
}
