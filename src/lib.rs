//! pivot-view: typed ingestion, pivot view compilation and result projection
//!
//! Raw tabular input is canonicalized into a typed columnar dataset, view
//! configurations are compiled into queries for an external aggregation
//! engine, and engine results are projected back into labeled records.
//! The engine itself is injected through the [`Engine`] trait.

pub mod config;
pub mod data;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod projection;
pub mod session;
pub mod utils;
pub mod view;

use std::collections::BTreeSet;

pub use data::canonicalizer::{CanonicalDataset, Canonicalizer};
pub use data::columnar_decoder::{ColumnarDecoder, DecodedColumn, DecodedTable};
pub use data::computed::ComputedColumn;
#[cfg(feature = "arrow")]
pub use data::columnar_decoder::ArrowIpcDecoder;
pub use data::date_parser::{ChronoDateParser, DateParser};
pub use data::dtype::{ColumnDef, ColumnSchema, DType, ROW_KEY};
pub use data::value::{ColumnData, RawValue, Scalar};
pub use diagnostics::{Component, Diagnostic, DiagnosticLog};
pub use engine::{CellDelta, Engine, Header, QueryId, SubscriptionId, TableBuild, TableId, ViewId};
pub use error::{OperatorKind, Result, ViewError};
pub use projection::{OutputFormat, ProjectionRequest, Record, ResultProjector, UpdatePlan, ROW_PATH};
pub use session::Session;
pub use view::{CompiledQuery, Sides, ViewConfig, ViewQueryCompiler};

/// Canonicalize raw input with the default date parser and no columnar decoder
pub fn ingest(raw: &RawValue, prior: Option<&ColumnSchema>) -> Result<CanonicalDataset> {
    let parser = ChronoDateParser::new();
    Canonicalizer::new(&parser).canonicalize(raw, prior)
}

/// Parse CSV text and canonicalize it
pub fn ingest_csv(text: &str) -> Result<CanonicalDataset> {
    ingest(&data::csv_input::parse_csv(text)?, None)
}

pub fn compile_view(config: &ViewConfig, schema: &ColumnSchema) -> Result<CompiledQuery> {
    let parser = ChronoDateParser::new();
    ViewQueryCompiler::new(&parser).compile(config, schema)
}

pub fn project<E: Engine + ?Sized>(
    engine: &E,
    query: QueryId,
    compiled: &CompiledQuery,
    viewport: Option<&view::Viewport>,
    request: &ProjectionRequest,
) -> Result<Vec<Record>> {
    ResultProjector::new(engine).project(query, compiled, viewport, request)
}

/// Serialize records with default output settings
pub fn serialize(records: &[Record], format: OutputFormat) -> Result<Vec<u8>> {
    projection::serialize(records, format, &config::OutputConfig::default())
}

pub fn translate_delta(deltas: &[CellDelta]) -> BTreeSet<usize> {
    projection::to_affected_rows(deltas)
}
