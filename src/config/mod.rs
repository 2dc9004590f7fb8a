//! Configuration module
//!
//! TOML-backed settings for ingestion, output formatting, diagnostics and
//! logging.

pub mod config;

pub use config::{Config, DiagnosticsConfig, IngestConfig, LoggingConfig, OutputConfig};
