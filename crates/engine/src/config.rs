//! Ingest configuration via TOML
//!
//! An extraction run is described by one file with three sections:
//!
//! ```toml
//! [input]
//! path = "/data/segments"
//! depth = 2
//! extensions = ["json"]
//!
//! [extraction]
//! features = ["captions", "average_color"]
//! threads = 4
//! optimize = true
//!
//! [database]
//! backend = "fulltext"
//! batch_size = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vitrum_core::{VitrumError, VitrumResult};
use vitrum_features::FeatureRegistry;
use vitrum_storage::DatabaseConfig;

/// Default walk depth below the input root
pub const DEFAULT_INPUT_DEPTH: usize = 2;

/// Default number of extraction workers
pub const DEFAULT_THREADS: usize = 2;

/// Where items come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Root directory to walk; not needed for in-memory providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Maximum walk depth below the root
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Accepted file extensions, case-insensitive; empty accepts everything
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn default_depth() -> usize {
    DEFAULT_INPUT_DEPTH
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            path: None,
            depth: DEFAULT_INPUT_DEPTH,
            extensions: Vec::new(),
        }
    }
}

/// Which modules run and how wide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Registered feature names to extract
    #[serde(default)]
    pub features: Vec<String>,
    /// Worker count
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Writer batch size; falls back to `[database].batch_size`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Optimize written entities once the run ends, where the backend supports it
    #[serde(default = "default_optimize")]
    pub optimize: bool,
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_optimize() -> bool {
    true
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            features: Vec::new(),
            threads: DEFAULT_THREADS,
            batch_size: None,
            optimize: true,
        }
    }
}

/// Complete description of one extraction run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// `[input]` section
    #[serde(default)]
    pub input: InputConfig,
    /// `[extraction]` section
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// `[database]` section
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl IngestConfig {
    /// Config extracting `features` with default settings
    pub fn for_features<S: AsRef<str>>(features: &[S]) -> Self {
        IngestConfig {
            extraction: ExtractionConfig {
                features: features.iter().map(|f| f.as_ref().to_string()).collect(),
                ..ExtractionConfig::default()
            },
            ..IngestConfig::default()
        }
    }

    /// Builder: set worker count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.extraction.threads = threads;
        self
    }

    /// Builder: enable or disable post-run entity optimization
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.extraction.optimize = optimize;
        self
    }

    /// Builder: set input root
    pub fn with_input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input.path = Some(path.into());
        self
    }

    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the document does not parse.
    pub fn from_toml_str(content: &str) -> VitrumResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> VitrumResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VitrumError::invalid_config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            VitrumError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Serialize to TOML and write it to `path`
    pub fn write_to_file(&self, path: &Path) -> VitrumResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VitrumError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Effective writer batch size
    pub fn batch_size(&self) -> usize {
        self.extraction
            .batch_size
            .unwrap_or(self.database.batch_size)
    }

    /// Structural checks that need no registry
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when no feature is named, a feature is named
    /// twice, or the thread count or batch size is zero.
    pub fn validate(&self) -> VitrumResult<()> {
        if self.extraction.features.is_empty() {
            return Err(VitrumError::invalid_config("no features to extract"));
        }
        for (i, name) in self.extraction.features.iter().enumerate() {
            if self.extraction.features[..i].contains(name) {
                return Err(VitrumError::invalid_config(format!(
                    "feature '{}' listed twice",
                    name
                )));
            }
        }
        if self.extraction.threads == 0 {
            return Err(VitrumError::invalid_config("threads must be at least 1"));
        }
        if self.batch_size() == 0 {
            return Err(VitrumError::invalid_config("batch_size must be at least 1"));
        }
        Ok(())
    }

    /// [`validate`](Self::validate), then check every feature can extract
    pub fn validate_against(&self, registry: &FeatureRegistry) -> VitrumResult<()> {
        self.validate()?;
        for name in &self.extraction.features {
            if !registry.contains(name) {
                return Err(VitrumError::invalid_config(format!(
                    "unknown feature '{}'",
                    name
                )));
            }
            if !registry.has_extractor(name) {
                return Err(VitrumError::invalid_config(format!(
                    "feature '{}' has no extractor",
                    name
                )));
            }
        }
        Ok(())
    }
}
