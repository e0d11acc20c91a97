//! Database configuration
//!
//! Selects the backend and the default batch size for writers. Usually read
//! as the `[database]` section of an ingest config file:
//!
//! ```toml
//! [database]
//! # "memory" (default) or "fulltext"
//! backend = "fulltext"
//! batch_size = 100
//! ```

use serde::{Deserialize, Serialize};

/// Default number of rows buffered per writer before a flush
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Row store with brute-force vector search and a naive text scan
    #[default]
    Memory,
    /// Inverted-index store with BM25 ranking
    Fulltext,
}

impl Backend {
    /// Get the backend name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Fulltext => "fulltext",
        }
    }

    /// Parse a backend name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Backend::Memory),
            "fulltext" | "lucene" => Some(Backend::Fulltext),
            _ => None,
        }
    }
}

/// Backend selection and writer defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Which backend to open
    #[serde(default)]
    pub backend: Backend,
    /// Rows buffered per writer before a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: Backend::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl DatabaseConfig {
    /// Config for a backend with the default batch size
    pub fn for_backend(backend: Backend) -> Self {
        DatabaseConfig {
            backend,
            ..Self::default()
        }
    }

    /// Builder: set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(Backend::parse("Fulltext"), Some(Backend::Fulltext));
        assert_eq!(Backend::parse("lucene"), Some(Backend::Fulltext));
        assert_eq!(Backend::parse("memory"), Some(Backend::Memory));
        assert_eq!(Backend::parse("cottontail"), None);
        assert_eq!(Backend::Fulltext.name(), "fulltext");
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let config: DatabaseConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DatabaseConfig::default());
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_deserialize_backend() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"backend": "fulltext", "batch_size": 5}"#).unwrap();
        assert_eq!(config.backend, Backend::Fulltext);
        assert_eq!(config.batch_size, 5);
    }
}
