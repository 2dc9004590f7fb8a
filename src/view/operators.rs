//! Closed operator sets for filters, aggregates and sort directions
//!
//! User-facing operator strings are parsed once, at compile time, into these
//! enums. Anything not listed here is rejected with `UnknownOperator`.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{OperatorKind, Result, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    And,
    Or,
    LessThan,
    GreaterThan,
    Equals,
    Contains,
    LessThanOrEquals,
    GreaterThanOrEquals,
    NotEquals,
    BeginsWith,
    EndsWith,
    In,
    IsNan,
    IsNotNan,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        let op = match op {
            "&" | "and" => FilterOp::And,
            "|" | "or" => FilterOp::Or,
            "<" => FilterOp::LessThan,
            ">" => FilterOp::GreaterThan,
            "==" => FilterOp::Equals,
            "contains" => FilterOp::Contains,
            "<=" => FilterOp::LessThanOrEquals,
            ">=" => FilterOp::GreaterThanOrEquals,
            "!=" => FilterOp::NotEquals,
            "begins with" => FilterOp::BeginsWith,
            "ends with" => FilterOp::EndsWith,
            "in" => FilterOp::In,
            "is nan" => FilterOp::IsNan,
            "is not nan" => FilterOp::IsNotNan,
            _ => return None,
        };
        Some(op)
    }

    /// Parse an operator used inside a filter term
    pub fn parse_filter(op: &str) -> Result<Self> {
        Self::parse(op).ok_or_else(|| ViewError::UnknownOperator {
            kind: OperatorKind::Filter,
            op: op.to_string(),
        })
    }

    /// Parse the operator combining filter terms; only AND and OR qualify
    pub fn parse_combinator(op: &str) -> Result<Self> {
        match Self::parse(op) {
            Some(combinator) if combinator.is_combinator() => Ok(combinator),
            _ => Err(ViewError::UnknownOperator {
                kind: OperatorKind::Combinator,
                op: op.to_string(),
            }),
        }
    }

    pub fn is_combinator(&self) -> bool {
        matches!(self, FilterOp::And | FilterOp::Or)
    }

    /// Operators whose operand is a set of values
    pub fn takes_set(&self) -> bool {
        matches!(self, FilterOp::In)
    }

    /// Operators that ignore their operand
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOp::IsNan | FilterOp::IsNotNan)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::And => "and",
            FilterOp::Or => "or",
            FilterOp::LessThan => "<",
            FilterOp::GreaterThan => ">",
            FilterOp::Equals => "==",
            FilterOp::Contains => "contains",
            FilterOp::LessThanOrEquals => "<=",
            FilterOp::GreaterThanOrEquals => ">=",
            FilterOp::NotEquals => "!=",
            FilterOp::BeginsWith => "begins with",
            FilterOp::EndsWith => "ends with",
            FilterOp::In => "in",
            FilterOp::IsNan => "is nan",
            FilterOp::IsNotNan => "is not nan",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    DistinctCount,
    Sum,
    Mul,
    Mean,
    Count,
    WeightedMean,
    Unique,
    Any,
    Median,
    Join,
    ScaledDiv,
    ScaledAdd,
    Dominant,
    First,
    Last,
    And,
    Or,
    HighWaterMark,
    LowWaterMark,
    SumAbs,
    SumNotNull,
    MeanByCount,
    Identity,
    DistinctLeaf,
    PctSumParent,
    PctSumGrandTotal,
}

impl AggregateOp {
    pub fn parse(op: &str) -> Result<Self> {
        let parsed = match op {
            "distinct count" | "distinctcount" | "distinct" => AggregateOp::DistinctCount,
            "sum" => AggregateOp::Sum,
            "mul" => AggregateOp::Mul,
            "avg" | "mean" => AggregateOp::Mean,
            "count" => AggregateOp::Count,
            "weighted mean" => AggregateOp::WeightedMean,
            "unique" => AggregateOp::Unique,
            "any" => AggregateOp::Any,
            "median" => AggregateOp::Median,
            "join" => AggregateOp::Join,
            "div" => AggregateOp::ScaledDiv,
            "add" => AggregateOp::ScaledAdd,
            "dominant" => AggregateOp::Dominant,
            "first" => AggregateOp::First,
            "last" => AggregateOp::Last,
            "and" => AggregateOp::And,
            "or" => AggregateOp::Or,
            "high" => AggregateOp::HighWaterMark,
            "low" => AggregateOp::LowWaterMark,
            "sum abs" => AggregateOp::SumAbs,
            "sum not null" => AggregateOp::SumNotNull,
            "mean by count" => AggregateOp::MeanByCount,
            "identity" => AggregateOp::Identity,
            "distinct leaf" => AggregateOp::DistinctLeaf,
            "pct sum parent" => AggregateOp::PctSumParent,
            "pct sum grand total" => AggregateOp::PctSumGrandTotal,
            _ => {
                return Err(ViewError::UnknownOperator {
                    kind: OperatorKind::Aggregate,
                    op: op.to_string(),
                })
            }
        };
        Ok(parsed)
    }

    /// Number of dependency columns the operator reads
    pub fn arity(&self) -> usize {
        match self {
            AggregateOp::WeightedMean => 2,
            _ => 1,
        }
    }

    /// Operators whose result is a count regardless of input type
    pub fn is_count(&self) -> bool {
        matches!(self, AggregateOp::Count | AggregateOp::DistinctCount)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::DistinctCount => "distinct count",
            AggregateOp::Sum => "sum",
            AggregateOp::Mul => "mul",
            AggregateOp::Mean => "mean",
            AggregateOp::Count => "count",
            AggregateOp::WeightedMean => "weighted mean",
            AggregateOp::Unique => "unique",
            AggregateOp::Any => "any",
            AggregateOp::Median => "median",
            AggregateOp::Join => "join",
            AggregateOp::ScaledDiv => "div",
            AggregateOp::ScaledAdd => "add",
            AggregateOp::Dominant => "dominant",
            AggregateOp::First => "first",
            AggregateOp::Last => "last",
            AggregateOp::And => "and",
            AggregateOp::Or => "or",
            AggregateOp::HighWaterMark => "high",
            AggregateOp::LowWaterMark => "low",
            AggregateOp::SumAbs => "sum abs",
            AggregateOp::SumNotNull => "sum not null",
            AggregateOp::MeanByCount => "mean by count",
            AggregateOp::Identity => "identity",
            AggregateOp::DistinctLeaf => "distinct leaf",
            AggregateOp::PctSumParent => "pct sum parent",
            AggregateOp::PctSumGrandTotal => "pct sum grand total",
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort directions; the engine code is the position in this list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    None,
    #[default]
    Asc,
    Desc,
    ColAsc,
    ColDesc,
    AscAbs,
    DescAbs,
    ColAscAbs,
    ColDescAbs,
}

impl SortDirection {
    const ALL: [(SortDirection, &'static str); 9] = [
        (SortDirection::None, "none"),
        (SortDirection::Asc, "asc"),
        (SortDirection::Desc, "desc"),
        (SortDirection::ColAsc, "col asc"),
        (SortDirection::ColDesc, "col desc"),
        (SortDirection::AscAbs, "asc abs"),
        (SortDirection::DescAbs, "desc abs"),
        (SortDirection::ColAscAbs, "col asc abs"),
        (SortDirection::ColDescAbs, "col desc abs"),
    ];

    pub fn parse(direction: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|(_, name)| *name == direction)
            .map(|(dir, _)| *dir)
            .ok_or_else(|| ViewError::UnknownOperator {
                kind: OperatorKind::SortDirection,
                op: direction.to_string(),
            })
    }

    pub fn code(&self) -> u8 {
        Self::ALL
            .iter()
            .position(|(dir, _)| dir == self)
            .unwrap_or(0) as u8
    }

    pub fn as_str(&self) -> &'static str {
        Self::ALL[self.code() as usize].1
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! serialize_as_str {
    ($($ty:ty),*) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                    serializer.serialize_str(self.as_str())
                }
            }
        )*
    };
}

serialize_as_str!(FilterOp, AggregateOp, SortDirection);
