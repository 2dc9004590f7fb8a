//! Translates a `ViewConfig` into an engine-ready `CompiledQuery`

use serde::Serialize;
use tracing::{debug, warn};

use crate::data::date_parser::DateParser;
use crate::data::dtype::{ColumnSchema, DType, ROW_KEY};
use crate::data::value::{RawValue, Scalar};
use crate::diagnostics::{Component, Diagnostic};
use crate::error::{Result, ViewError};
use crate::view::config::{FilterSpec, FilterValue, SortSpec, ViewConfig};
use crate::view::operators::{AggregateOp, FilterOp, SortDirection};

/// Pivot sidedness: flat, row-pivoted, or row-and-column-pivoted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sides {
    Zero,
    One,
    Two,
}

impl Sides {
    pub fn count(&self) -> u8 {
        match self {
            Sides::Zero => 0,
            Sides::One => 1,
            Sides::Two => 2,
        }
    }

    pub fn is_pivoted(&self) -> bool {
        !matches!(self, Sides::Zero)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterOperand {
    Value(Scalar),
    Set(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledFilter {
    pub column: String,
    pub op: FilterOp,
    pub operand: FilterOperand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledAggregate {
    pub label: String,
    pub op: AggregateOp,
    pub columns: Vec<String>,
}

/// Sort on a compiled aggregate position. An unresolved column has no index
/// and is ignored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortEntry {
    pub aggregate_index: Option<usize>,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn new(aggregate_index: usize, direction: SortDirection) -> Self {
        Self {
            aggregate_index: Some(aggregate_index),
            direction,
        }
    }

    /// Engine form: -1 marks an unresolved entry
    pub fn engine_index(&self) -> i64 {
        self.aggregate_index.map(|i| i as i64).unwrap_or(-1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sides: Sides,
    pub filter_op: FilterOp,
    pub filters: Vec<CompiledFilter>,
    pub aggregates: Vec<CompiledAggregate>,
    pub sort: Vec<SortEntry>,
    pub row_pivot: Vec<String>,
    pub column_pivot: Vec<String>,
    pub column_only: bool,
    /// 0-based expansion depths
    pub row_pivot_depth: usize,
    pub column_pivot_depth: usize,
    #[serde(skip)]
    pub warnings: Vec<Diagnostic>,
}

impl CompiledQuery {
    pub fn aggregate_labels(&self) -> Vec<String> {
        self.aggregates.iter().map(|a| a.label.clone()).collect()
    }

    /// Sort passed at registration. Two-sided queries register without one
    /// and apply the remapped sort after expansion.
    pub fn registration_sort(&self) -> &[SortEntry] {
        match self.sides {
            Sides::Two => &[],
            _ => &self.sort,
        }
    }

    /// Expand each resolved sort entry once per column-pivot group.
    ///
    /// Two-sided results repeat the aggregate set per group, so with
    /// `total_columns` realized columns there are `total_columns / n`
    /// groups for `n` aggregates, and entry `(i, dir)` becomes
    /// `(i + g * n, dir)` for every group `g`.
    pub fn remap_sort_for_groups(&self, total_columns: usize) -> Vec<SortEntry> {
        let n = self.aggregates.len();
        if n == 0 {
            return Vec::new();
        }
        let groups = total_columns / n;
        (0..groups)
            .flat_map(|group| {
                self.sort.iter().filter_map(move |entry| {
                    entry
                        .aggregate_index
                        .map(|idx| SortEntry::new(idx + group * n, entry.direction))
                })
            })
            .collect()
    }
}

pub struct ViewQueryCompiler<'a> {
    parser: &'a dyn DateParser,
}

impl<'a> ViewQueryCompiler<'a> {
    pub fn new(parser: &'a dyn DateParser) -> Self {
        Self { parser }
    }

    pub fn compile(&self, config: &ViewConfig, schema: &ColumnSchema) -> Result<CompiledQuery> {
        let mut warnings = Vec::new();

        let mut row_pivot = config.row_pivot.clone();
        let column_pivot = config.column_pivot.clone();
        let column_only = row_pivot.is_empty() && !column_pivot.is_empty();
        if column_only {
            row_pivot = vec![ROW_KEY.to_string()];
        }

        for column in &row_pivot {
            Self::check_column(schema, column, "row pivot")?;
        }
        for column in &column_pivot {
            Self::check_column(schema, column, "column pivot")?;
        }

        let filter_op = match &config.filter_op {
            Some(op) => FilterOp::parse_combinator(op)?,
            None => FilterOp::And,
        };

        let filters = config
            .filter
            .iter()
            .map(|spec| {
                Self::check_column(schema, &spec.column, "filter")?;
                let op = FilterOp::parse_filter(&spec.op)?;
                Self::check_operand(spec, op)?;
                let operand = match (&spec.value, schema.dtype_of(&spec.column)) {
                    (value, Some(DType::Time)) => self.time_operand(&spec.column, value, &mut warnings),
                    (FilterValue::One(value), _) => FilterOperand::Value(value.clone()),
                    (FilterValue::Many(values), _) => FilterOperand::Set(values.clone()),
                };
                Ok(CompiledFilter {
                    column: spec.column.clone(),
                    op,
                    operand,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let aggregates = self.compile_aggregates(config, schema, column_only)?;

        let sides = match (row_pivot.is_empty(), column_pivot.is_empty()) {
            (true, true) => Sides::Zero,
            (false, true) => Sides::One,
            _ => Sides::Two,
        };

        // Row pivots are structural labels under two-sided pivoting, not sortable data
        let sort_specs: Vec<&SortSpec> = config
            .sort
            .iter()
            .filter(|spec| sides != Sides::Two || !row_pivot.iter().any(|p| p == spec.column()))
            .collect();
        let sort = sort_specs
            .into_iter()
            .map(|spec| Self::resolve_sort(spec, &aggregates, &mut warnings))
            .collect::<Result<Vec<_>>>()?;

        let row_pivot_depth = config
            .row_pivot_depth
            .map(|d| d.saturating_sub(1))
            .unwrap_or(row_pivot.len());
        let column_pivot_depth = config
            .column_pivot_depth
            .map(|d| d.saturating_sub(1))
            .unwrap_or(column_pivot.len());

        debug!(
            target: "compile",
            "Compiled view: sides={}, column_only={}, {} filters, {} aggregates, {} sorts",
            sides.count(),
            column_only,
            filters.len(),
            aggregates.len(),
            sort.len()
        );

        Ok(CompiledQuery {
            sides,
            filter_op,
            filters,
            aggregates,
            sort,
            row_pivot,
            column_pivot,
            column_only,
            row_pivot_depth,
            column_pivot_depth,
            warnings,
        })
    }

    fn check_column(schema: &ColumnSchema, column: &str, context: &str) -> Result<()> {
        if column == ROW_KEY || schema.contains(column) {
            Ok(())
        } else {
            Err(ViewError::UnknownColumn {
                column: column.to_string(),
                context: context.to_string(),
            })
        }
    }

    fn compile_aggregates(
        &self,
        config: &ViewConfig,
        schema: &ColumnSchema,
        column_only: bool,
    ) -> Result<Vec<CompiledAggregate>> {
        let Some(specs) = &config.aggregate else {
            // One aggregate per real column
            let op = if column_only {
                AggregateOp::Any
            } else {
                AggregateOp::DistinctCount
            };
            return Ok(schema
                .names()
                .into_iter()
                .filter(|name| name != ROW_KEY)
                .map(|name| CompiledAggregate {
                    label: name.clone(),
                    op,
                    columns: vec![name],
                })
                .collect());
        };

        specs
            .iter()
            .map(|spec| {
                let requested = AggregateOp::parse(&spec.op)?;
                let columns = spec.column.columns();
                let label = spec.name.clone().unwrap_or_else(|| columns.join(","));

                if columns.len() != requested.arity() {
                    return Err(ViewError::InvalidAggregateArity {
                        label,
                        op: spec.op.clone(),
                        expected: requested.arity(),
                        observed: columns.len(),
                    });
                }
                for column in &columns {
                    Self::check_column(schema, column, "aggregate")?;
                }

                // Column-only pivoting is a transposition; aggregation is neutralized
                let op = if column_only { AggregateOp::Any } else { requested };
                Ok(CompiledAggregate { label, op, columns })
            })
            .collect()
    }

    fn resolve_sort(
        spec: &SortSpec,
        aggregates: &[CompiledAggregate],
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<SortEntry> {
        let direction = match spec.direction() {
            Some(direction) => SortDirection::parse(direction)?,
            None => SortDirection::Asc,
        };
        let column = spec.column();
        let aggregate_index = aggregates
            .iter()
            .position(|a| a.label == column)
            .or_else(|| aggregates.iter().position(|a| a.columns.join(",") == column));

        if aggregate_index.is_none() {
            warn!(target: "compile", "Sort column '{}' matches no aggregate; ignoring", column);
            warnings.push(
                Diagnostic::new(Component::Compile, "sort column matches no aggregate and is ignored")
                    .with_subject(column.to_string()),
            );
        }
        Ok(SortEntry {
            aggregate_index,
            direction,
        })
    }

    /// Set operators take a list and every other binary operator a single value
    fn check_operand(spec: &FilterSpec, op: FilterOp) -> Result<()> {
        let is_set = matches!(spec.value, FilterValue::Many(_));
        if op.is_unary() || op.takes_set() == is_set {
            return Ok(());
        }
        Err(ViewError::InvalidFilterOperand {
            column: spec.column.clone(),
            op: op.to_string(),
            expected: if op.takes_set() { "a list of values" } else { "a single value" },
        })
    }

    fn time_operand(&self, column: &str, value: &FilterValue, warnings: &mut Vec<Diagnostic>) -> FilterOperand {
        let mut to_millis = |scalar: &Scalar| -> Scalar {
            let raw = match scalar {
                Scalar::Null => return Scalar::Null,
                Scalar::Bool(b) => RawValue::Bool(*b),
                Scalar::Int(i) => RawValue::Int(*i),
                Scalar::Float(f) => RawValue::Float(*f),
                Scalar::Str(s) => RawValue::Str(s.clone()),
            };
            match self.parser.parse(&raw) {
                Some(ms) => Scalar::Int(ms),
                None => {
                    warn!(target: "compile", "Filter value '{}' on date column '{}' is not a date", scalar, column);
                    warnings.push(
                        Diagnostic::new(Component::Compile, format!("filter value '{}' is not a date", scalar))
                            .with_subject(column.to_string()),
                    );
                    Scalar::Null
                }
            }
        };
        match value {
            FilterValue::One(scalar) => FilterOperand::Value(to_millis(scalar)),
            FilterValue::Many(scalars) => FilterOperand::Set(scalars.iter().map(&mut to_millis).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::date_parser::ChronoDateParser;
    use crate::data::dtype::ColumnDef;
    use crate::error::OperatorKind;
    use crate::view::config::{AggregateSpec, FilterSpec};

    fn schema() -> ColumnSchema {
        ColumnSchema::new(vec![
            ColumnDef::new("region", DType::String),
            ColumnDef::new("year", DType::Int32),
            ColumnDef::new("sales", DType::Float64),
            ColumnDef::new("qty", DType::Int32),
            ColumnDef::new("when", DType::Time),
        ])
        .unwrap()
    }

    fn compile(config: &ViewConfig) -> Result<CompiledQuery> {
        let parser = ChronoDateParser::new();
        ViewQueryCompiler::new(&parser).compile(config, &schema())
    }

    #[test]
    fn test_flat_view_defaults() {
        let query = compile(&ViewConfig::default()).unwrap();
        assert_eq!(query.sides, Sides::Zero);
        assert!(!query.column_only);
        assert_eq!(query.filter_op, FilterOp::And);
        assert_eq!(query.aggregate_labels(), vec!["region", "year", "sales", "qty", "when"]);
        assert!(query.aggregates.iter().all(|a| a.op == AggregateOp::DistinctCount));
        assert_eq!(query.row_pivot_depth, 0);
    }

    #[test]
    fn test_sidedness() {
        let one = compile(&ViewConfig {
            row_pivot: vec!["region".into()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(one.sides, Sides::One);
        assert_eq!(one.row_pivot_depth, 1);

        let two = compile(&ViewConfig {
            row_pivot: vec!["region".into()],
            column_pivot: vec!["year".into()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(two.sides, Sides::Two);
        assert!(!two.column_only);
    }

    #[test]
    fn test_column_only_injects_row_key_and_forces_any() {
        let query = compile(&ViewConfig {
            column_pivot: vec!["region".into()],
            aggregate: Some(vec![AggregateSpec::new("sum", "sales")]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.sides, Sides::Two);
        assert!(query.column_only);
        assert_eq!(query.row_pivot, vec![ROW_KEY]);
        assert_eq!(query.aggregates[0].op, AggregateOp::Any);
        assert_eq!(query.aggregates[0].label, "sales");
    }

    #[test]
    fn test_weighted_mean_arity() {
        let err = compile(&ViewConfig {
            aggregate: Some(vec![AggregateSpec::with_columns("weighted mean", &["sales"])]),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ViewError::InvalidAggregateArity { expected: 2, observed: 1, .. }
        ));

        let ok = compile(&ViewConfig {
            aggregate: Some(vec![AggregateSpec::with_columns("weighted mean", &["sales", "qty"])]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ok.aggregates[0].label, "sales,qty");

        let err = compile(&ViewConfig {
            aggregate: Some(vec![AggregateSpec::with_columns("sum", &["sales", "qty"])]),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ViewError::InvalidAggregateArity { expected: 1, observed: 2, .. }));
    }

    #[test]
    fn test_unknown_operators() {
        let err = compile(&ViewConfig {
            filter: vec![FilterSpec::new("sales", "~=", 1i64)],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ViewError::UnknownOperator { kind: OperatorKind::Filter, .. }));

        let err = compile(&ViewConfig {
            aggregate: Some(vec![AggregateSpec::new("avg2", "sales")]),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ViewError::UnknownOperator { kind: OperatorKind::Aggregate, .. }));

        let err = compile(&ViewConfig {
            filter_op: Some("xor".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ViewError::UnknownOperator { kind: OperatorKind::Combinator, .. }));
    }

    #[test]
    fn test_unknown_columns_are_rejected() {
        let err = compile(&ViewConfig {
            row_pivot: vec!["country".into()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ViewError::UnknownColumn { ref column, .. } if column == "country"));
    }

    #[test]
    fn test_date_filter_operands_become_millis() {
        let query = compile(&ViewConfig {
            filter: vec![
                FilterSpec::new("when", ">", "2020-01-01"),
                FilterSpec::new("when", "<", "soon"),
                FilterSpec::new("region", "==", "EU"),
            ],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.filters[0].operand, FilterOperand::Value(Scalar::Int(1_577_836_800_000)));
        assert_eq!(query.filters[1].operand, FilterOperand::Value(Scalar::Null));
        assert_eq!(query.filters[2].operand, FilterOperand::Value(Scalar::from("EU")));
        assert_eq!(query.warnings.len(), 1);
    }

    #[test]
    fn test_sort_resolves_against_aggregates() {
        let query = compile(&ViewConfig {
            aggregate: Some(vec![
                AggregateSpec::new("sum", "sales"),
                AggregateSpec::new("count", "qty").named("n"),
            ]),
            sort: vec![SortSpec::new("n", "desc"), SortSpec::from("qty"), SortSpec::from("region")],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.sort[0], SortEntry::new(1, SortDirection::Desc));
        assert_eq!(query.sort[1], SortEntry::new(1, SortDirection::Asc));
        assert_eq!(query.sort[2].aggregate_index, None);
        assert_eq!(query.sort[2].engine_index(), -1);
        assert_eq!(query.warnings.len(), 1);
    }

    #[test]
    fn test_two_sided_drops_row_pivot_sorts() {
        let query = compile(&ViewConfig {
            row_pivot: vec!["region".into()],
            column_pivot: vec!["year".into()],
            sort: vec![SortSpec::from("region"), SortSpec::from("sales")],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.sort.len(), 1);
        assert_eq!(query.sort[0].aggregate_index, Some(2));
        assert!(query.registration_sort().is_empty());
    }

    #[test]
    fn test_sort_remap_across_groups() {
        let query = compile(&ViewConfig {
            row_pivot: vec!["region".into()],
            column_pivot: vec!["year".into()],
            aggregate: Some(vec![
                AggregateSpec::new("sum", "sales"),
                AggregateSpec::new("sum", "qty"),
                AggregateSpec::new("count", "region"),
            ]),
            sort: vec![SortSpec::from("qty")],
            ..Default::default()
        })
        .unwrap();
        let remapped = query.remap_sort_for_groups(6);
        assert_eq!(
            remapped,
            vec![SortEntry::new(1, SortDirection::Asc), SortEntry::new(4, SortDirection::Asc)]
        );
    }

    #[test]
    fn test_depths_are_zero_based() {
        let query = compile(&ViewConfig {
            row_pivot: vec!["region".into(), "year".into()],
            column_pivot: vec!["qty".into()],
            row_pivot_depth: Some(1),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.row_pivot_depth, 0);
        assert_eq!(query.column_pivot_depth, 1);
    }

    #[test]
    fn test_empty_aggregate_list_means_none() {
        let query = compile(&ViewConfig {
            aggregate: Some(vec![]),
            row_pivot: vec!["region".into()],
            column_pivot: vec!["year".into()],
            sort: vec![SortSpec::from("sales")],
            ..Default::default()
        })
        .unwrap();
        assert!(query.aggregates.is_empty());
        assert!(query.remap_sort_for_groups(10).is_empty());
    }
}
