//! Record serialization
//!
//! JSON and CSV share the record sequence produced by the projector; this is
//! the only format-specific step.

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::config::OutputConfig;
use crate::error::Result;
use crate::projection::projector::{Record, ROW_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
}

/// Records as a JSON array of objects; the row path is an array under `__ROW_PATH__`
pub fn to_json_value(records: &[Record]) -> JsonValue {
    let rows = records
        .iter()
        .map(|record| {
            let mut object = Map::new();
            if let Some(path) = &record.row_path {
                object.insert(
                    ROW_PATH.to_string(),
                    JsonValue::Array(path.iter().map(|s| s.to_json()).collect()),
                );
            }
            for (label, value) in &record.values {
                object.insert(label.clone(), value.to_json());
            }
            JsonValue::Object(object)
        })
        .collect();
    JsonValue::Array(rows)
}

/// Records as delimited text. The header is every key in first-seen order;
/// the row path is a single column joined by the configured separator.
pub fn to_csv_string(records: &[Record], config: &OutputConfig) -> Result<String> {
    let mut headers: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !headers.contains(&key) {
                headers.push(key);
            }
        }
    }

    let mut writer = WriterBuilder::new()
        .delimiter(config.delimiter_byte())
        .from_writer(Vec::new());

    if !headers.is_empty() {
        writer.write_record(&headers)?;
    }
    for record in records {
        let fields: Vec<String> = headers
            .iter()
            .map(|&header| {
                if header == ROW_PATH {
                    record
                        .row_path
                        .as_ref()
                        .map(|path| {
                            path.iter()
                                .map(|s| s.to_string())
                                .collect::<Vec<_>>()
                                .join(&config.row_path_separator)
                        })
                        .unwrap_or_default()
                } else {
                    record.get(header).map(|v| v.to_string()).unwrap_or_default()
                }
            })
            .collect();
        writer.write_record(&fields)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn serialize(records: &[Record], format: OutputFormat, config: &OutputConfig) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Json => {
            let value = to_json_value(records);
            let bytes = if config.pretty_json {
                serde_json::to_vec_pretty(&value)?
            } else {
                serde_json::to_vec(&value)?
            };
            Ok(bytes)
        }
        OutputFormat::Csv => Ok(to_csv_string(records, config)?.into_bytes()),
    }
}
