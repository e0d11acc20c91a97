//! Fulltext backend
//!
//! Entities live in per-entity segmented inverted indices with BM25 ranking.
//! Rows are stored alongside the postings, so point lookups work too.
//! Nearest-neighbour lookups are not supported by this backend.

pub mod index;
pub mod query;
pub mod scorer;
pub mod tokenizer;

use dashmap::DashMap;
use index::FulltextIndex;
use query::TermQuery;
use std::sync::Arc;
use tracing::{debug, info};
use vitrum_core::{
    AttributeDefinition, Distance, EntityCreator, PersistencyWriter, PrimitiveValue, Row,
    Selector, VitrumError, VitrumResult,
};

// ============================================================================
// FulltextStore
// ============================================================================

/// Shared fulltext storage for all entities
#[derive(Debug, Default)]
pub struct FulltextStore {
    indices: DashMap<String, Arc<FulltextIndex>>,
}

impl FulltextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all entities
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Index of an entity
    pub fn index(&self, entity: &str) -> VitrumResult<Arc<FulltextIndex>> {
        self.indices
            .get(entity)
            .map(|i| Arc::clone(i.value()))
            .ok_or_else(|| VitrumError::entity_not_found(entity))
    }

    /// Merge the segments of one entity
    pub fn optimize(&self, entity: &str) -> VitrumResult<usize> {
        let merged = self.index(entity)?.optimize();
        debug!(entity = %entity, segments = merged, "Optimized fulltext entity");
        Ok(merged)
    }

    /// Merge the segments of every entity
    pub fn optimize_all(&self) {
        let indices: Vec<(String, Arc<FulltextIndex>)> = self
            .indices
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (name, index) in indices {
            let merged = index.optimize();
            if merged > 1 {
                info!(entity = %name, segments = merged, "Merged fulltext segments");
            }
        }
    }
}

// ============================================================================
// FulltextEntityCreator
// ============================================================================

/// Entity creator for the fulltext store
pub struct FulltextEntityCreator {
    store: Arc<FulltextStore>,
}

impl FulltextEntityCreator {
    /// Create a creator bound to a store
    pub fn new(store: Arc<FulltextStore>) -> Self {
        FulltextEntityCreator { store }
    }
}

impl EntityCreator for FulltextEntityCreator {
    fn create_entity(&self, name: &str, fields: &[AttributeDefinition]) -> VitrumResult<()> {
        match self.store.indices.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(VitrumError::entity_exists(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(FulltextIndex::new(name, fields.to_vec())));
                Ok(())
            }
        }
    }

    fn drop_entity(&self, name: &str) -> VitrumResult<()> {
        self.store
            .indices
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VitrumError::entity_not_found(name))
    }

    fn exists_entity(&self, name: &str) -> bool {
        self.store.indices.contains_key(name)
    }
}

// ============================================================================
// FulltextSelector
// ============================================================================

/// Selector for the fulltext store
pub struct FulltextSelector {
    store: Arc<FulltextStore>,
    open: Option<Arc<FulltextIndex>>,
}

impl FulltextSelector {
    /// Create an unopened selector bound to a store
    pub fn new(store: Arc<FulltextStore>) -> Self {
        FulltextSelector { store, open: None }
    }

    fn index(&self) -> VitrumResult<&FulltextIndex> {
        self.open
            .as_deref()
            .ok_or_else(|| VitrumError::NotOpen("fulltext selector".to_string()))
    }
}

impl Selector for FulltextSelector {
    fn open(&mut self, entity: &str) -> VitrumResult<()> {
        self.open = Some(self.store.index(entity)?);
        Ok(())
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn get_rows(&self, field: &str, values: &[PrimitiveValue]) -> VitrumResult<Vec<Row>> {
        Ok(self.index()?.rows_matching(field, values))
    }

    fn get_all(&self) -> VitrumResult<Vec<Row>> {
        Ok(self.index()?.all_rows())
    }

    fn get_fulltext_rows(
        &self,
        limit: usize,
        field: &str,
        terms: &[String],
    ) -> VitrumResult<Vec<Row>> {
        let queries: Vec<TermQuery> = terms.iter().map(|t| TermQuery::parse(t)).collect();
        self.index()?.search(field, &queries, limit)
    }

    fn get_nearest_neighbour_rows(
        &self,
        _k: usize,
        _query: &[f32],
        _field: &str,
        _distance: Distance,
    ) -> VitrumResult<Vec<Row>> {
        Err(VitrumError::unsupported(
            "nearest neighbour lookup on the fulltext backend",
        ))
    }
}

// ============================================================================
// FulltextWriter
// ============================================================================

/// Writer for the fulltext store; each batch becomes one segment
pub struct FulltextWriter {
    store: Arc<FulltextStore>,
    open: Option<Arc<FulltextIndex>>,
}

impl FulltextWriter {
    /// Create an unopened writer bound to a store
    pub fn new(store: Arc<FulltextStore>) -> Self {
        FulltextWriter { store, open: None }
    }

    fn index(&self) -> VitrumResult<&FulltextIndex> {
        self.open
            .as_deref()
            .ok_or_else(|| VitrumError::NotOpen("fulltext writer".to_string()))
    }
}

impl PersistencyWriter for FulltextWriter {
    fn open(&mut self, entity: &str) -> VitrumResult<()> {
        self.open = Some(self.store.index(entity)?);
        Ok(())
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn persist_batch(&mut self, rows: Vec<Row>) -> VitrumResult<()> {
        self.index()?.add_batch(rows)
    }

    fn id_exists(&self, id: &str) -> VitrumResult<bool> {
        Ok(self.index()?.id_exists(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrum_core::{AttributeType, FeatureDescriptor, FEATURE_FIELD, ID_FIELD, SCORE_FIELD};

    fn store_with(entity: &str) -> Arc<FulltextStore> {
        let store = Arc::new(FulltextStore::new());
        FulltextEntityCreator::new(store.clone())
            .create_entity(
                entity,
                &[
                    AttributeDefinition::new(ID_FIELD, AttributeType::String),
                    AttributeDefinition::new(FEATURE_FIELD, AttributeType::Text),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_write_then_search() {
        let store = store_with("ocr");
        let mut writer = FulltextWriter::new(store.clone());
        writer.open("ocr").unwrap();
        writer
            .persist_batch(vec![
                FeatureDescriptor::text("s1", "STOP sign").to_row(),
                FeatureDescriptor::text("s2", "exit").to_row(),
            ])
            .unwrap();
        assert!(writer.id_exists("s1").unwrap());
        assert!(!writer.id_exists("s9").unwrap());

        let mut selector = FulltextSelector::new(store);
        selector.open("ocr").unwrap();
        let rows = selector
            .get_fulltext_rows(10, FEATURE_FIELD, &["stop~1".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][ID_FIELD], PrimitiveValue::from("s1"));
        assert!(rows[0][SCORE_FIELD].get_float().unwrap() > 0.0);
        assert_eq!(selector.get_by_id("s2").unwrap().len(), 1);
    }

    #[test]
    fn test_nearest_neighbour_unsupported() {
        let store = store_with("ocr");
        let mut selector = FulltextSelector::new(store);
        selector.open("ocr").unwrap();
        let err = selector
            .get_nearest_neighbour_rows(1, &[0.0], FEATURE_FIELD, Distance::Euclidean)
            .unwrap_err();
        assert!(matches!(err, VitrumError::Unsupported(_)));
    }

    #[test]
    fn test_drop_and_recreate() {
        let store = store_with("ocr");
        let creator = FulltextEntityCreator::new(store.clone());
        assert!(creator.exists_entity("ocr"));
        creator.drop_entity("ocr").unwrap();
        assert!(creator.drop_entity("ocr").unwrap_err().is_not_found());
        assert!(store.entity_names().is_empty());
    }

    #[test]
    fn test_optimize_all() {
        let store = store_with("ocr");
        let mut writer = FulltextWriter::new(store.clone());
        writer.open("ocr").unwrap();
        writer
            .persist(FeatureDescriptor::text("s1", "one").to_row())
            .unwrap();
        writer
            .persist(FeatureDescriptor::text("s2", "two").to_row())
            .unwrap();
        assert_eq!(store.index("ocr").unwrap().segment_count(), 2);
        store.optimize_all();
        assert_eq!(store.index("ocr").unwrap().segment_count(), 1);
        assert!(store.optimize("missing").is_err());
    }
}
