//! Feature module registry
//!
//! Maps feature names to factories for their capabilities. A feature may
//! register an extractor factory, a retriever factory, or both; callers ask
//! for the capability they need and never downcast.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = FeatureRegistry::new();
//! registry.register_extractor("captions", || Box::new(FulltextRetriever::description_text_search()));
//!
//! // The dispatcher builds one fresh instance per worker
//! let module = registry.create_extractor("captions");
//! ```

use crate::extractor::Extractor;
use crate::retriever::Retriever;
use crate::text::FulltextRetriever;
use crate::vector::{AverageColor, SubDivAverageColor, VectorFeatureModule};
use std::collections::BTreeMap;
use std::sync::Arc;
use vitrum_core::PersistentOperator;

/// Factory for extractor instances
pub type ExtractorFactory = Arc<dyn Fn() -> Box<dyn Extractor> + Send + Sync>;

/// Factory for retriever instances
pub type RetrieverFactory = Arc<dyn Fn() -> Box<dyn Retriever> + Send + Sync>;

#[derive(Clone, Default)]
struct Capabilities {
    extractor: Option<ExtractorFactory>,
    retriever: Option<RetrieverFactory>,
}

/// Registry of feature modules by name
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    features: BTreeMap<String, Capabilities>,
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.names())
            .finish()
    }
}

impl FeatureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in module
    ///
    /// | name                  | module                       |
    /// |-----------------------|------------------------------|
    /// | `captions`            | caption fulltext search      |
    /// | `audio_transcription` | transcript fulltext search   |
    /// | `ocr`                 | OCR fulltext search (fuzzy)  |
    /// | `average_color`       | mean color vector            |
    /// | `subdiv_average_color`| 2x2 grid mean color vector   |
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_module("captions", FulltextRetriever::description_text_search);
        registry.register_module("audio_transcription", FulltextRetriever::audio_transcription_search);
        registry.register_module("ocr", FulltextRetriever::ocr_search);
        registry.register_module("average_color", || VectorFeatureModule::new(AverageColor));
        registry.register_module("subdiv_average_color", || {
            VectorFeatureModule::new(SubDivAverageColor)
        });
        registry
    }

    /// Register an extractor factory
    pub fn register_extractor<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Extractor> + Send + Sync + 'static,
    {
        self.features.entry(name.to_string()).or_default().extractor = Some(Arc::new(factory));
    }

    /// Register a retriever factory
    pub fn register_retriever<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Retriever> + Send + Sync + 'static,
    {
        self.features.entry(name.to_string()).or_default().retriever = Some(Arc::new(factory));
    }

    /// Register a module implementing both capabilities
    pub fn register_module<M, F>(&mut self, name: &str, factory: F)
    where
        M: Extractor + Retriever + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        let f = Arc::clone(&factory);
        self.register_extractor(name, move || Box::new(f()) as Box<dyn Extractor>);
        self.register_retriever(name, move || Box::new(factory()) as Box<dyn Retriever>);
    }

    /// Fresh extractor instance, `None` if the feature has no extractor
    pub fn create_extractor(&self, name: &str) -> Option<Box<dyn Extractor>> {
        self.features
            .get(name)
            .and_then(|c| c.extractor.as_ref())
            .map(|f| f())
    }

    /// Fresh retriever instance, `None` if the feature has no retriever
    pub fn create_retriever(&self, name: &str) -> Option<Box<dyn Retriever>> {
        self.features
            .get(name)
            .and_then(|c| c.retriever.as_ref())
            .map(|f| f())
    }

    /// Whether a feature with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Whether the feature can extract
    pub fn has_extractor(&self, name: &str) -> bool {
        self.features
            .get(name)
            .is_some_and(|c| c.extractor.is_some())
    }

    /// Whether the feature can retrieve
    pub fn has_retriever(&self, name: &str) -> bool {
        self.features
            .get(name)
            .is_some_and(|c| c.retriever.is_some())
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    /// One persistent operator per registered feature
    ///
    /// Prefers the extractor; retriever-only features contribute their
    /// retriever.
    pub fn persistent_operators(&self) -> Vec<(String, Box<dyn PersistentOperator>)> {
        let mut operators: Vec<(String, Box<dyn PersistentOperator>)> = Vec::new();
        for (name, caps) in &self.features {
            if let Some(f) = &caps.extractor {
                operators.push((name.clone(), Box::new(f()) as Box<dyn PersistentOperator>));
            } else if let Some(f) = &caps.retriever {
                operators.push((name.clone(), Box::new(f()) as Box<dyn PersistentOperator>));
            }
        }
        operators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_both_capabilities() {
        let registry = FeatureRegistry::with_defaults();
        assert_eq!(registry.names().len(), 5);
        for name in registry.names() {
            assert!(registry.has_extractor(&name), "{name}");
            assert!(registry.has_retriever(&name), "{name}");
        }
        assert!(registry.create_extractor("ocr").is_some());
        assert!(registry.create_retriever("missing").is_none());
    }

    #[test]
    fn test_retriever_only_feature() {
        let mut registry = FeatureRegistry::new();
        registry.register_retriever("text", || {
            Box::new(FulltextRetriever::new("features_text")) as Box<dyn Retriever>
        });
        assert!(registry.contains("text"));
        assert!(!registry.has_extractor("text"));
        assert!(registry.create_extractor("text").is_none());

        let operators = registry.persistent_operators();
        assert_eq!(operators.len(), 1);
        assert_eq!(operators[0].1.table_names(), vec!["features_text"]);
    }

    #[test]
    fn test_factories_build_fresh_instances() {
        let registry = FeatureRegistry::with_defaults();
        let a = registry.create_extractor("captions").unwrap();
        let b = registry.create_extractor("captions").unwrap();
        assert_eq!(a.table_names(), b.table_names());
    }
}
