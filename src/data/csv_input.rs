//! CSV text to row-major input
//!
//! Fields are dynamically typed so the canonicalizer sees numbers and
//! booleans rather than raw text: empty field is null, `true`/`false`
//! (any case) is a boolean, integer text is an integer, other numeric text
//! is a float, everything else stays a string.

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::data::value::RawValue;
use crate::error::Result;

/// Parse CSV text into a list of ordered field maps
pub fn parse_csv(text: &str) -> Result<RawValue> {
    parse_csv_with_delimiter(text, b',')
}

pub fn parse_csv_with_delimiter(text: &str, delimiter: u8) -> Result<RawValue> {
    // A header starting with the delimiter has an unnamed first column
    let owned;
    let text = if text.as_bytes().first() == Some(&delimiter) {
        owned = format!("_{}", text);
        owned.as_str()
    } else {
        text
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(name, field)| (name.clone(), type_field(field)))
            .collect();
        rows.push(RawValue::Map(row));
    }

    debug!(target: "ingest", "Parsed CSV: {} columns, {} rows", headers.len(), rows.len());
    Ok(RawValue::List(rows))
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

fn type_field(field: &str) -> RawValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return RawValue::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return RawValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return RawValue::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return RawValue::Int(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => RawValue::Float(f),
        _ => RawValue::Str(field.to_string()),
    }
}
