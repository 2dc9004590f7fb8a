//! Result projection: engine grid to records, records to bytes, deltas to rows

pub mod delta;
pub mod formatter;
pub mod projector;

pub use delta::{to_affected_rows, UpdatePlan};
pub use formatter::{serialize, to_csv_string, to_json_value, OutputFormat};
pub use projector::{ProjectionRequest, Record, ResultProjector, ROW_PATH};
