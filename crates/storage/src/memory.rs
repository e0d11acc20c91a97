//! In-memory row store
//!
//! This backend keeps every entity as a table of rows with an id index:
//! - MemoryStore: entity name -> table, shared by every selector and writer
//! - MemorySelector: point/filter lookups, brute-force nearest neighbour,
//!   and a naive fulltext scan
//! - MemoryWriter: appends rows, checks them against the entity schema
//!
//! Fulltext on this backend is a linear scan: the raw score of a row is the
//! number of term occurrences in the requested field. It has no corpus
//! statistics, so scores are not comparable with the fulltext backend.

use crate::distance;
use crate::fulltext::query::TermQuery;
use crate::fulltext::tokenizer::tokenize;
use crate::validate::validate_row;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use vitrum_core::{
    AttributeDefinition, Distance, EntityCreator, PersistencyWriter, PrimitiveValue, Row,
    Selector, VitrumError, VitrumResult, DISTANCE_FIELD, ID_FIELD, SCORE_FIELD,
};

// ============================================================================
// Table
// ============================================================================

#[derive(Debug)]
struct Table {
    schema: Vec<AttributeDefinition>,
    rows: Vec<Row>,
    /// id -> row positions; ids are not unique
    id_index: HashMap<String, Vec<usize>>,
}

impl Table {
    fn new(schema: Vec<AttributeDefinition>) -> Self {
        Table {
            schema,
            rows: Vec::new(),
            id_index: HashMap::new(),
        }
    }

    fn validate(&self, entity: &str, row: &Row) -> VitrumResult<()> {
        validate_row(entity, &self.schema, row)
    }

    fn append(&mut self, row: Row) {
        let position = self.rows.len();
        if let Some(id) = row.get(ID_FIELD).and_then(PrimitiveValue::get_string) {
            self.id_index.entry(id).or_default().push(position);
        }
        self.rows.push(row);
    }
}

type TableRef = Arc<RwLock<Table>>;

// ============================================================================
// MemoryStore
// ============================================================================

/// Shared in-memory storage for all entities
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, TableRef>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all entities
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of rows in an entity, `None` if it does not exist
    pub fn row_count(&self, entity: &str) -> Option<usize> {
        self.tables.get(entity).map(|t| t.read().rows.len())
    }

    fn table(&self, entity: &str) -> VitrumResult<TableRef> {
        self.tables
            .get(entity)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| VitrumError::entity_not_found(entity))
    }
}

// ============================================================================
// MemoryEntityCreator
// ============================================================================

/// Entity creator for the in-memory store
pub struct MemoryEntityCreator {
    store: Arc<MemoryStore>,
}

impl MemoryEntityCreator {
    /// Create a creator bound to a store
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryEntityCreator { store }
    }
}

impl EntityCreator for MemoryEntityCreator {
    fn create_entity(&self, name: &str, fields: &[AttributeDefinition]) -> VitrumResult<()> {
        if fields.iter().any(|f| f.prefers_fulltext_handler()) {
            debug!(entity = %name, "Fulltext handler hint ignored by memory backend");
        }
        match self.store.tables.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(VitrumError::entity_exists(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(Table::new(fields.to_vec()))));
                Ok(())
            }
        }
    }

    fn drop_entity(&self, name: &str) -> VitrumResult<()> {
        self.store
            .tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VitrumError::entity_not_found(name))
    }

    fn exists_entity(&self, name: &str) -> bool {
        self.store.tables.contains_key(name)
    }
}

// ============================================================================
// MemorySelector
// ============================================================================

/// Selector for the in-memory store
pub struct MemorySelector {
    store: Arc<MemoryStore>,
    open: Option<(String, TableRef)>,
}

impl MemorySelector {
    /// Create an unopened selector bound to a store
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemorySelector { store, open: None }
    }

    fn table(&self) -> VitrumResult<&TableRef> {
        self.open
            .as_ref()
            .map(|(_, t)| t)
            .ok_or_else(|| VitrumError::NotOpen("memory selector".to_string()))
    }
}

impl Selector for MemorySelector {
    fn open(&mut self, entity: &str) -> VitrumResult<()> {
        let table = self.store.table(entity)?;
        self.open = Some((entity.to_string(), table));
        Ok(())
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn get_rows(&self, field: &str, values: &[PrimitiveValue]) -> VitrumResult<Vec<Row>> {
        let table = self.table()?.read();
        if field == ID_FIELD {
            let mut rows = Vec::new();
            for value in values {
                let Some(id) = value.get_string() else { continue };
                if let Some(positions) = table.id_index.get(&id) {
                    rows.extend(positions.iter().map(|p| table.rows[*p].clone()));
                }
            }
            return Ok(rows);
        }
        Ok(table
            .rows
            .iter()
            .filter(|row| row.get(field).is_some_and(|v| values.contains(v)))
            .cloned()
            .collect())
    }

    fn get_all(&self) -> VitrumResult<Vec<Row>> {
        Ok(self.table()?.read().rows.clone())
    }

    fn get_fulltext_rows(
        &self,
        limit: usize,
        field: &str,
        terms: &[String],
    ) -> VitrumResult<Vec<Row>> {
        if limit == 0 || terms.is_empty() {
            return Ok(Vec::new());
        }
        let queries: Vec<TermQuery> = terms.iter().map(|t| TermQuery::parse(t)).collect();
        let table = self.table()?.read();

        let mut hits: Vec<(f64, usize)> = Vec::new();
        for (position, row) in table.rows.iter().enumerate() {
            let Some(text) = row.get(field).and_then(PrimitiveValue::as_str) else {
                continue;
            };
            let tokens = tokenize(text);
            let occurrences: usize = queries.iter().map(|q| q.count_in(&tokens)).sum();
            if occurrences > 0 {
                hits.push((occurrences as f64, position));
            }
        }
        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        trace!(hits = hits.len(), "Memory fulltext scan complete");

        Ok(hits
            .into_iter()
            .map(|(score, position)| {
                let mut row = table.rows[position].clone();
                row.insert(SCORE_FIELD.to_string(), PrimitiveValue::Float(score as f32));
                row
            })
            .collect())
    }

    fn get_nearest_neighbour_rows(
        &self,
        k: usize,
        query: &[f32],
        field: &str,
        distance: Distance,
    ) -> VitrumResult<Vec<Row>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let table = self.table()?.read();
        let mut hits: Vec<(f64, usize)> = table
            .rows
            .iter()
            .enumerate()
            .filter_map(|(position, row)| {
                let vector = row.get(field)?.as_vector()?;
                (vector.len() == query.len())
                    .then(|| (distance::compute(distance, query, vector), position))
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|(d, position)| {
                let mut row = Row::with_capacity(2);
                if let Some(id) = table.rows[position].get(ID_FIELD) {
                    row.insert(ID_FIELD.to_string(), id.clone());
                }
                row.insert(DISTANCE_FIELD.to_string(), PrimitiveValue::Double(d));
                row
            })
            .collect())
    }
}

// ============================================================================
// MemoryWriter
// ============================================================================

/// Writer for the in-memory store
pub struct MemoryWriter {
    store: Arc<MemoryStore>,
    open: Option<(String, TableRef)>,
}

impl MemoryWriter {
    /// Create an unopened writer bound to a store
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryWriter { store, open: None }
    }
}

impl PersistencyWriter for MemoryWriter {
    fn open(&mut self, entity: &str) -> VitrumResult<()> {
        let table = self.store.table(entity)?;
        self.open = Some((entity.to_string(), table));
        Ok(())
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn persist_batch(&mut self, rows: Vec<Row>) -> VitrumResult<()> {
        let (entity, table) = self
            .open
            .as_ref()
            .ok_or_else(|| VitrumError::NotOpen("memory writer".to_string()))?;
        let mut table = table.write();
        // Validate the whole batch before appending anything
        for row in &rows {
            table.validate(entity, row)?;
        }
        for row in rows {
            table.append(row);
        }
        Ok(())
    }

    fn id_exists(&self, id: &str) -> VitrumResult<bool> {
        let (_, table) = self
            .open
            .as_ref()
            .ok_or_else(|| VitrumError::NotOpen("memory writer".to_string()))?;
        Ok(table.read().id_index.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrum_core::{AttributeType, FeatureDescriptor, FEATURE_FIELD};

    fn text_schema() -> Vec<AttributeDefinition> {
        vec![
            AttributeDefinition::new(ID_FIELD, AttributeType::String),
            AttributeDefinition::new(FEATURE_FIELD, AttributeType::Text),
        ]
    }

    fn setup(entity: &str, schema: Vec<AttributeDefinition>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        MemoryEntityCreator::new(store.clone())
            .create_entity(entity, &schema)
            .unwrap();
        store
    }

    #[test]
    fn test_create_twice_fails() {
        let store = setup("t", text_schema());
        let creator = MemoryEntityCreator::new(store);
        assert!(matches!(
            creator.create_entity("t", &text_schema()),
            Err(VitrumError::EntityExists { .. })
        ));
    }

    #[test]
    fn test_drop_missing_is_not_found() {
        let creator = MemoryEntityCreator::new(Arc::new(MemoryStore::new()));
        assert!(creator.drop_entity("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_write_and_lookup_by_id() {
        let store = setup("t", text_schema());
        let mut writer = MemoryWriter::new(store.clone());
        writer.open("t").unwrap();
        writer
            .persist(FeatureDescriptor::text("s1", "a red car").to_row())
            .unwrap();
        writer
            .persist(FeatureDescriptor::text("s1", "a blue car").to_row())
            .unwrap();
        assert!(writer.id_exists("s1").unwrap());
        assert!(!writer.id_exists("s2").unwrap());

        let mut selector = MemorySelector::new(store);
        selector.open("t").unwrap();
        assert_eq!(selector.get_by_id("s1").unwrap().len(), 2);
        assert_eq!(selector.get_all().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let store = setup("t", text_schema());
        let mut writer = MemoryWriter::new(store.clone());
        writer.open("t").unwrap();
        let row = FeatureDescriptor::text("s1", "x")
            .with_field("bogus", PrimitiveValue::Int(1))
            .to_row();
        assert!(writer.persist(row).is_err());
        assert_eq!(store.row_count("t"), Some(0));
    }

    #[test]
    fn test_fulltext_scan_scores_occurrences() {
        let store = setup("t", text_schema());
        let mut writer = MemoryWriter::new(store.clone());
        writer.open("t").unwrap();
        writer
            .persist_batch(vec![
                FeatureDescriptor::text("s1", "dog dog cat").to_row(),
                FeatureDescriptor::text("s2", "cat").to_row(),
                FeatureDescriptor::text("s3", "bird").to_row(),
            ])
            .unwrap();

        let mut selector = MemorySelector::new(store);
        selector.open("t").unwrap();
        let rows = selector
            .get_fulltext_rows(10, FEATURE_FIELD, &["dog".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][SCORE_FIELD], PrimitiveValue::Float(2.0));

        let rows = selector
            .get_fulltext_rows(1, FEATURE_FIELD, &["cat".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = selector
            .get_fulltext_rows(0, FEATURE_FIELD, &["cat".to_string()])
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_nearest_neighbour() {
        let schema = vec![
            AttributeDefinition::new(ID_FIELD, AttributeType::String),
            AttributeDefinition::vector(FEATURE_FIELD, 2),
        ];
        let store = setup("v", schema);
        let mut writer = MemoryWriter::new(store.clone());
        writer.open("v").unwrap();
        writer
            .persist_batch(vec![
                FeatureDescriptor::vector("far", vec![1.0, 1.0]).to_row(),
                FeatureDescriptor::vector("near", vec![0.1, 0.0]).to_row(),
            ])
            .unwrap();
        assert!(writer
            .persist(FeatureDescriptor::vector("bad", vec![1.0]).to_row())
            .is_err());

        let mut selector = MemorySelector::new(store);
        selector.open("v").unwrap();
        let rows = selector
            .get_nearest_neighbour_rows(1, &[0.0, 0.0], FEATURE_FIELD, Distance::Euclidean)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][ID_FIELD], PrimitiveValue::from("near"));
    }

    #[test]
    fn test_closed_selector_errors() {
        let store = setup("t", text_schema());
        let mut selector = MemorySelector::new(store);
        selector.open("t").unwrap();
        selector.close();
        selector.close();
        assert!(matches!(selector.get_all(), Err(VitrumError::NotOpen(_))));
    }
}
