//! Data layer: typed values, schemas and ingestion
//!
//! Raw input of any supported shape is turned into a `CanonicalDataset`
//! here before it is handed to the engine.

pub mod canonicalizer;
pub mod columnar_decoder;
pub mod computed;
pub mod csv_input;
pub mod date_parser;
pub mod dtype;
pub mod type_inference;
pub mod value;
