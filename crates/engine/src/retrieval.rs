//! Retrieval service
//!
//! Query-side entry point over a [`Database`] and a [`FeatureRegistry`].
//! Every call builds fresh retrievers, opens their selectors, queries and
//! closes them again; nothing is cached between calls.

use std::collections::BTreeMap;
use tracing::{debug, error, info, trace};
use vitrum_core::{
    MetadataEntry, PersistentOperator, QueryConfig, ScoreElement, SegmentContainer, VitrumError,
    VitrumResult,
};
use vitrum_features::{FeatureRegistry, Retriever};
use vitrum_storage::{Database, MetadataReader};

/// Results of a category query, keyed by feature name
pub type CategoryResults = BTreeMap<String, Vec<ScoreElement>>;

/// Similarity queries, metadata lookups and entity lifecycle
#[derive(Debug, Clone)]
pub struct RetrievalService {
    database: Database,
    registry: FeatureRegistry,
    categories: BTreeMap<String, Vec<String>>,
}

impl RetrievalService {
    /// Service over `database` with the modules of `registry`
    pub fn new(database: Database, registry: FeatureRegistry) -> Self {
        RetrievalService {
            database,
            registry,
            categories: BTreeMap::new(),
        }
    }

    /// Builder: name a group of features queried together
    pub fn with_category<S: AsRef<str>>(mut self, category: &str, features: &[S]) -> Self {
        self.categories.insert(
            category.to_string(),
            features.iter().map(|f| f.as_ref().to_string()).collect(),
        );
        self
    }

    /// The database queries run against
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The registered modules
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Features of a category; an unknown category that names a feature
    /// resolves to that feature alone
    pub fn category_features(&self, category: &str) -> Option<Vec<String>> {
        match self.categories.get(category) {
            Some(features) => Some(features.clone()),
            None if self.registry.has_retriever(category) => Some(vec![category.to_string()]),
            None => None,
        }
    }

    /// Create the entities of every registered module and the metadata entity
    pub fn setup_entities(&self) {
        let creators = self.database.entity_creator_supplier();
        for (name, operator) in self.registry.persistent_operators() {
            debug!(feature = %name, "Setting up entities");
            operator.initialize_persistent_layer(&creators);
        }
        match creators().create_metadata_entity() {
            Ok(()) => info!("Created metadata entity"),
            Err(VitrumError::EntityExists { .. }) => debug!("Metadata entity already exists"),
            Err(e) => error!(error = %e, "Failed to create metadata entity"),
        }
    }

    /// Drop the entities of every registered module
    pub fn drop_entities(&self) {
        let creators = self.database.entity_creator_supplier();
        for (name, operator) in self.registry.persistent_operators() {
            debug!(feature = %name, "Dropping entities");
            operator.drop_persistent_layer(&creators);
        }
    }

    fn open_retriever(&self, feature: &str) -> VitrumResult<Box<dyn Retriever>> {
        let mut retriever = self.registry.create_retriever(feature).ok_or_else(|| {
            VitrumError::invalid_config(format!("no retriever registered for '{}'", feature))
        })?;
        Retriever::init(retriever.as_mut(), &self.database.selector_supplier())?;
        Ok(retriever)
    }

    /// Rank stored segments against `query` with one feature
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an unknown feature and propagates storage
    /// errors; unsupported query shapes yield an empty list.
    pub fn retrieve(
        &self,
        feature: &str,
        query: &SegmentContainer,
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        let mut retriever = self.open_retriever(feature)?;
        let result = retriever.get_similar(query, config);
        Retriever::finish(retriever.as_mut());
        let results = result?;
        trace!(feature = %feature, results = results.len(), "Retrieved");
        Ok(results)
    }

    /// Rank stored segments against the stored descriptor of `segment_id`
    pub fn more_like_this(
        &self,
        feature: &str,
        segment_id: &str,
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        let mut retriever = self.open_retriever(feature)?;
        let result = retriever.get_similar_to_id(segment_id, config);
        Retriever::finish(retriever.as_mut());
        result
    }

    /// Query every feature of a category
    ///
    /// A failing feature is logged and contributes an empty list; scores of
    /// different features are not comparable and are not fused here.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` only for an unknown category.
    pub fn retrieve_category(
        &self,
        category: &str,
        query: &SegmentContainer,
        config: &QueryConfig,
    ) -> VitrumResult<CategoryResults> {
        let features = self.category_features(category).ok_or_else(|| {
            VitrumError::invalid_config(format!("unknown category '{}'", category))
        })?;
        let mut results = CategoryResults::new();
        for feature in features {
            let hits = match self.retrieve(&feature, query, config) {
                Ok(hits) => hits,
                Err(e) => {
                    error!(category = %category, feature = %feature, error = %e, "Feature query failed");
                    Vec::new()
                }
            };
            results.insert(feature, hits);
        }
        Ok(results)
    }

    /// Metadata of `object_ids`, limited to `domains` unless empty
    pub fn lookup_metadata(
        &self,
        object_ids: &[String],
        domains: &[String],
    ) -> VitrumResult<Vec<MetadataEntry>> {
        let mut reader = MetadataReader::open(&self.database.selector_supplier())?;
        let entries = reader.lookup(object_ids, domains);
        reader.close();
        entries
    }
}
