use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::KNOWN_BAD_SHEET_ROWS;
use crate::error::{PipelineError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Run configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub output: OutputConfig,
    pub database: DatabaseConfig,
    pub cleaning: CleaningConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Per-year score tables.
    pub scores_dir: PathBuf,
    /// Per-year song tables.
    pub songs_dir: PathBuf,
    /// CSV export of the 2009+ song sheet.
    pub song_sheet: PathBuf,
    /// Entries of the upcoming edition, if a prediction input should be produced.
    pub prediction_input: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            scores_dir: PathBuf::from("data/scores"),
            songs_dir: PathBuf::from("data/songs"),
            song_sheet: PathBuf::from("data/song_data.csv"),
            prediction_input: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Relations as CSV files plus the run report.
    pub dir: PathBuf,
    pub write_csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            write_csv: true,
        }
    }
}

/// Passed explicitly to the SQLite sink; no connection outlives a persist call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub enabled: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("esc_dataset.db"),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// 0-based data rows of the song sheet dropped before any other processing.
    pub known_bad_rows: Vec<usize>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            known_bad_rows: KNOWN_BAD_SHEET_ROWS.to_vec(),
        }
    }
}

impl Config {
    /// Load `ESC_CONFIG` or `config.toml`, then apply environment overrides.
    ///
    /// A missing default `config.toml` yields the defaults; a missing file named
    /// by `ESC_CONFIG` is an error.
    pub fn load() -> Result<Self> {
        let config = match std::env::var("ESC_CONFIG") {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("ESC_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("ESC_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        self
    }

    pub fn known_bad_rows(&self) -> BTreeSet<usize> {
        self.cleaning.known_bad_rows.iter().copied().collect()
    }
}
