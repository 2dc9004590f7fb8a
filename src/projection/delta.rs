//! Step-delta translation for update notifications

use std::collections::BTreeSet;

use crate::engine::CellDelta;

/// Deduplicated physical rows touched by a set of changed cells, ascending
pub fn to_affected_rows(deltas: &[CellDelta]) -> BTreeSet<usize> {
    deltas.iter().map(|delta| delta.row).collect()
}

/// What an update notification has to re-project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    /// The engine cannot report deltas; callbacks get no records
    Unsupported,
    /// The change could not be narrowed to rows; re-project the whole view
    Full,
    /// Re-project these rows one at a time, in ascending order
    Rows(BTreeSet<usize>),
}

impl UpdatePlan {
    pub fn from_delta(delta: Option<&[CellDelta]>) -> Self {
        match delta {
            None => UpdatePlan::Unsupported,
            Some([]) => UpdatePlan::Full,
            Some(cells) => UpdatePlan::Rows(to_affected_rows(cells)),
        }
    }
}
