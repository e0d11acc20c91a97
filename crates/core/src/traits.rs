//! Persistence contracts
//!
//! This module defines the traits that decouple feature modules from concrete
//! storage engines:
//! - EntityCreator: create/drop entities from attribute definitions
//! - Selector: read side, opened against one entity
//! - PersistencyWriter: write side, opened against one entity
//! - PersistentOperator: anything that owns entities
//!
//! Modules never receive a backend directly. They receive suppliers (zero
//! argument factories) so the caller controls connection lifetime and can swap
//! backends without touching module code.

use crate::error::{VitrumError, VitrumResult};
use crate::metadata::{MetadataEntry, METADATA_ENTITY};
use crate::query::Distance;
use crate::schema::AttributeDefinition;
use crate::value::PrimitiveValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Conventional id column
pub const ID_FIELD: &str = "id";

/// Conventional feature column
pub const FEATURE_FIELD: &str = "feature";

/// Column carrying the raw relevance of a fulltext hit
pub const SCORE_FIELD: &str = "ap_score";

/// Column carrying the raw distance of a nearest-neighbour hit
pub const DISTANCE_FIELD: &str = "distance";

/// One stored row: field name -> cell
pub type Row = HashMap<String, PrimitiveValue>;

// ============================================================================
// Entity lifecycle
// ============================================================================

/// Creates and drops entities in a backend
pub trait EntityCreator: Send {
    /// Create an entity with the given fields
    ///
    /// # Errors
    ///
    /// Returns `EntityExists` if the entity is already present, or a storage
    /// error if the backend rejects the schema.
    fn create_entity(&self, name: &str, fields: &[AttributeDefinition]) -> VitrumResult<()>;

    /// Drop an entity and all of its rows
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist.
    fn drop_entity(&self, name: &str) -> VitrumResult<()>;

    /// Whether the entity exists
    fn exists_entity(&self, name: &str) -> bool;

    /// Create the shared metadata entity
    fn create_metadata_entity(&self) -> VitrumResult<()> {
        self.create_entity(METADATA_ENTITY, &MetadataEntry::attribute_definitions())
    }
}

// ============================================================================
// Read side
// ============================================================================

/// Read access to one entity
///
/// Must be opened before use and closed to release backend resources.
/// `close` is idempotent.
pub trait Selector: Send {
    /// Bind this selector to an entity
    fn open(&mut self, entity: &str) -> VitrumResult<()>;

    /// Release the binding; safe to call repeatedly
    fn close(&mut self);

    /// Rows whose `field` equals any of `values`
    fn get_rows(&self, field: &str, values: &[PrimitiveValue]) -> VitrumResult<Vec<Row>>;

    /// Rows whose id column equals `id`
    fn get_by_id(&self, id: &str) -> VitrumResult<Vec<Row>> {
        self.get_rows(ID_FIELD, &[PrimitiveValue::from(id)])
    }

    /// All rows of the open entity
    fn get_all(&self) -> VitrumResult<Vec<Row>>;

    /// Ranked fulltext lookup of all `terms` at once against `field`
    ///
    /// Returns at most `limit` rows, each carrying the id and the raw
    /// relevance in [`SCORE_FIELD`]. A term may match the same row more than
    /// once; aggregation is the caller's job.
    fn get_fulltext_rows(&self, limit: usize, field: &str, terms: &[String])
        -> VitrumResult<Vec<Row>>;

    /// The `k` rows whose vector `field` is closest to `query`
    ///
    /// Each row carries the id and the raw distance in [`DISTANCE_FIELD`].
    fn get_nearest_neighbour_rows(
        &self,
        k: usize,
        query: &[f32],
        field: &str,
        distance: Distance,
    ) -> VitrumResult<Vec<Row>>;
}

// ============================================================================
// Write side
// ============================================================================

/// Write access to one entity
///
/// Not required to be safe for concurrent use: each worker owns its writer.
pub trait PersistencyWriter: Send {
    /// Bind this writer to an entity
    fn open(&mut self, entity: &str) -> VitrumResult<()>;

    /// Release the binding; safe to call repeatedly
    fn close(&mut self);

    /// Persist one row
    fn persist(&mut self, row: Row) -> VitrumResult<()> {
        self.persist_batch(vec![row])
    }

    /// Persist several rows
    ///
    /// All or nothing: a rejected batch leaves the entity unchanged.
    fn persist_batch(&mut self, rows: Vec<Row>) -> VitrumResult<()>;

    /// Whether a row with this id already exists in the open entity
    fn id_exists(&self, id: &str) -> VitrumResult<bool>;
}

/// Factory producing a fresh selector bound to the active backend
pub type SelectorSupplier = Arc<dyn Fn() -> Box<dyn Selector> + Send + Sync>;

/// Factory producing a fresh writer bound to the active backend
pub type WriterSupplier = Arc<dyn Fn() -> Box<dyn PersistencyWriter> + Send + Sync>;

/// Factory producing an entity creator bound to the active backend
pub type EntityCreatorSupplier = Arc<dyn Fn() -> Box<dyn EntityCreator> + Send + Sync>;

// ============================================================================
// PersistentOperator
// ============================================================================

/// Something that owns entities in the persistence layer
///
/// The creator is resolved through the supplier at call time, not at
/// construction time, since backends may be remote or expensive to reach.
pub trait PersistentOperator {
    /// Create the entities this operator needs
    fn initialize_persistent_layer(&self, supply: &EntityCreatorSupplier);

    /// Drop the entities this operator owns; safe when they do not exist
    fn drop_persistent_layer(&self, supply: &EntityCreatorSupplier);

    /// Entities this operator stores data in (default: none)
    fn table_names(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<T: PersistentOperator + ?Sized> PersistentOperator for Box<T> {
    fn initialize_persistent_layer(&self, supply: &EntityCreatorSupplier) {
        (**self).initialize_persistent_layer(supply)
    }

    fn drop_persistent_layer(&self, supply: &EntityCreatorSupplier) {
        (**self).drop_persistent_layer(supply)
    }

    fn table_names(&self) -> Vec<String> {
        (**self).table_names()
    }
}

/// Create an entity, logging instead of failing
///
/// An already existing entity is reported at info level; any other failure
/// at error level. Returns whether the entity exists afterwards.
pub fn create_entity_logged(
    creator: &dyn EntityCreator,
    name: &str,
    fields: &[AttributeDefinition],
) -> bool {
    match creator.create_entity(name, fields) {
        Ok(()) => {
            info!(entity = %name, "Created entity");
            true
        }
        Err(VitrumError::EntityExists { .. }) => {
            info!(entity = %name, "Entity already exists");
            true
        }
        Err(e) => {
            error!(entity = %name, error = %e, "Failed to create entity");
            false
        }
    }
}

/// Drop an entity, logging instead of failing
///
/// Dropping a missing entity is benign and logged as a warning; any other
/// failure is logged as an error. Never unwinds the caller.
pub fn drop_entity_logged(creator: &dyn EntityCreator, name: &str) {
    match creator.drop_entity(name) {
        Ok(()) => info!(entity = %name, "Dropped entity"),
        Err(e) if e.is_not_found() => {
            warn!(entity = %name, "Entity does not exist, nothing to drop")
        }
        Err(e) => error!(entity = %name, error = %e, "Failed to drop entity"),
    }
}
