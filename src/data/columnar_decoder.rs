//! Columnar binary buffer decoding
//!
//! Binary buffers arrive already typed; the decoder only has to hand back
//! named, typed columns. The `arrow` feature provides an Arrow IPC stream
//! decoder; any other format can plug in through [`ColumnarDecoder`].

use crate::data::value::ColumnData;
use crate::error::Result;

/// A named, typed column produced by a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedColumn {
    pub name: String,
    pub data: ColumnData,
}

/// Decoder output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTable {
    pub row_count: usize,
    pub columns: Vec<DecodedColumn>,
    /// Fields whose type has no canonical counterpart and were left out
    pub skipped: Vec<String>,
}

/// Collaborator that turns a binary buffer into typed columns
pub trait ColumnarDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedTable>;
}

#[cfg(feature = "arrow")]
pub use arrow_ipc::ArrowIpcDecoder;

#[cfg(feature = "arrow")]
mod arrow_ipc {
    use arrow::array::{ArrayRef, AsArray};
    use arrow::compute::cast;
    use arrow::datatypes::{
        DataType as ArrowType, Float32Type, Float64Type, Int32Type, Int64Type, TimeUnit,
        TimestampMillisecondType,
    };
    use arrow::error::ArrowError;
    use arrow::ipc::reader::StreamReader;
    use std::io::Cursor;
    use tracing::{debug, warn};

    use super::{ColumnarDecoder, DecodedColumn, DecodedTable};
    use crate::data::dtype::DType;
    use crate::data::value::ColumnData;
    use crate::error::{Result, ViewError};

    fn decode_error(e: ArrowError) -> ViewError {
        ViewError::Decode(e.to_string())
    }

    /// Decodes an Arrow IPC stream, concatenating all record batches
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ArrowIpcDecoder;

    impl ArrowIpcDecoder {
        pub fn new() -> Self {
            Self
        }

        fn target_dtype(data_type: &ArrowType) -> Option<DType> {
            match data_type {
                ArrowType::Boolean => Some(DType::Bool),
                ArrowType::Int8 | ArrowType::Int16 | ArrowType::Int32 => Some(DType::Int32),
                ArrowType::Int64 => Some(DType::Int64),
                ArrowType::Float32 => Some(DType::Float32),
                ArrowType::Float64 => Some(DType::Float64),
                ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Binary | ArrowType::LargeBinary => {
                    Some(DType::String)
                }
                ArrowType::Timestamp(_, _) | ArrowType::Date32 | ArrowType::Date64 => {
                    Some(DType::Time)
                }
                ArrowType::Dictionary(_, value_type) => Self::target_dtype(value_type),
                _ => None,
            }
        }

        fn append(data: &mut ColumnData, array: &ArrayRef) -> Result<()> {
            match data {
                ColumnData::Bool(out) => {
                    let arr = cast(array, &ArrowType::Boolean).map_err(decode_error)?;
                    out.extend(arr.as_boolean().iter());
                }
                ColumnData::Int32(out) => {
                    let arr = cast(array, &ArrowType::Int32).map_err(decode_error)?;
                    out.extend(arr.as_primitive::<Int32Type>().iter());
                }
                ColumnData::Int64(out) => {
                    let arr = cast(array, &ArrowType::Int64).map_err(decode_error)?;
                    out.extend(arr.as_primitive::<Int64Type>().iter());
                }
                ColumnData::Float32(out) => {
                    let arr = cast(array, &ArrowType::Float32).map_err(decode_error)?;
                    out.extend(arr.as_primitive::<Float32Type>().iter());
                }
                ColumnData::Float64(out) => {
                    let arr = cast(array, &ArrowType::Float64).map_err(decode_error)?;
                    out.extend(arr.as_primitive::<Float64Type>().iter());
                }
                ColumnData::Str(out) => {
                    let arr = cast(array, &ArrowType::Utf8).map_err(decode_error)?;
                    out.extend(arr.as_string::<i32>().iter().map(|v| v.map(str::to_string)));
                }
                ColumnData::Time(out) => {
                    let arr = cast(array, &ArrowType::Timestamp(TimeUnit::Millisecond, None))
                        .map_err(decode_error)?;
                    out.extend(arr.as_primitive::<TimestampMillisecondType>().iter());
                }
            }
            Ok(())
        }
    }

    impl ColumnarDecoder for ArrowIpcDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<DecodedTable> {
            let reader = StreamReader::try_new(Cursor::new(bytes), None).map_err(decode_error)?;
            let schema = reader.schema();

            let mut skipped = Vec::new();
            let mut slots: Vec<Option<ColumnData>> = Vec::with_capacity(schema.fields().len());
            for field in schema.fields() {
                match Self::target_dtype(field.data_type()) {
                    Some(dtype) => slots.push(Some(ColumnData::empty(dtype))),
                    None => {
                        warn!(target: "ingest", "Skipping Arrow field '{}' of unsupported type {:?}", field.name(), field.data_type());
                        skipped.push(field.name().clone());
                        slots.push(None);
                    }
                }
            }

            let mut row_count = 0;
            for batch in reader {
                let batch = batch.map_err(decode_error)?;
                row_count += batch.num_rows();
                for (idx, slot) in slots.iter_mut().enumerate() {
                    if let Some(data) = slot {
                        Self::append(data, batch.column(idx))?;
                    }
                }
            }

            let columns = schema
                .fields()
                .iter()
                .zip(slots)
                .filter_map(|(field, slot)| {
                    slot.map(|data| DecodedColumn {
                        name: field.name().clone(),
                        data,
                    })
                })
                .collect::<Vec<_>>();

            debug!(target: "ingest", "Decoded Arrow stream: {} rows, {} columns", row_count, columns.len());

            Ok(DecodedTable {
                row_count,
                columns,
                skipped,
            })
        }
    }

}
