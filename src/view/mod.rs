//! View configuration and its compilation into engine queries

pub mod compiler;
pub mod config;
pub mod operators;

pub use compiler::{
    CompiledAggregate, CompiledFilter, CompiledQuery, FilterOperand, Sides, SortEntry, ViewQueryCompiler,
};
pub use config::{AggregateSpec, ColumnRef, FilterSpec, FilterValue, SortSpec, ViewConfig, Viewport};
pub use operators::{AggregateOp, FilterOp, SortDirection};
