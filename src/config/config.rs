use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::DEFAULT_CAPACITY;
use crate::data::type_inference::DEFAULT_TYPE_SAMPLE;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub output: OutputConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Leading rows sampled for column names; doubles each time a wider row is seen
    pub key_sample_rows: usize,

    /// Leading present values sampled per column for type inference
    pub type_sample_values: usize,

    /// Record a diagnostic when sampled rows disagree on their key sets
    pub warn_on_inconsistent_rows: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_delimiter: char,

    /// Separator between row path elements in the CSV path column
    pub row_path_separator: String,

    pub pretty_json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Number of diagnostics kept by a session
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; RUST_LOG overrides it
    pub filter: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            key_sample_rows: 50,
            type_sample_values: DEFAULT_TYPE_SAMPLE,
            warn_on_inconsistent_rows: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_delimiter: ',',
            row_path_separator: "|".to_string(),
            pretty_json: false,
        }
    }
}

impl OutputConfig {
    /// The delimiter as a byte for the csv writer; non-ASCII falls back to ','
    pub fn delimiter_byte(&self) -> u8 {
        if self.csv_delimiter.is_ascii() {
            self.csv_delimiter as u8
        } else {
            b','
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            // Create default config if it doesn't exist
            let default_config = Self::default();
            default_config.save()?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("pivot-view").join("config.toml"))
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# pivot-view Configuration File
# Location: ~/.config/pivot-view/config.toml (Linux)
#           ~/Library/Application Support/pivot-view/config.toml (macOS)
#           %APPDATA%\pivot-view\config.toml (Windows)

[ingest]
# Leading rows sampled to discover column names in row-major input.
# The window doubles whenever a row with more keys is found.
key_sample_rows = 50

# Leading non-missing values sampled per column to infer its type
type_sample_values = 100

# Record a diagnostic when sampled rows have different key sets
warn_on_inconsistent_rows = true

[output]
# Field delimiter for CSV output
csv_delimiter = ","

# Separator used to join row path elements in CSV output
row_path_separator = "|"

# Pretty-print JSON output
pretty_json = false

[diagnostics]
# Number of diagnostics kept in memory per session (oldest evicted first)
capacity = 1000

[logging]
# Default tracing filter; RUST_LOG takes precedence when set
# Examples: "info", "debug", "ingest=debug,compile=trace"
filter = "info"
"#
        .to_string()
    }
}
