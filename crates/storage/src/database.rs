//! Database handle
//!
//! Owns the store of the configured backend and hands out the suppliers that
//! feature modules receive. Cloning a `Database` shares the store.

use crate::config::{Backend, DatabaseConfig};
use crate::fulltext::{FulltextEntityCreator, FulltextSelector, FulltextStore, FulltextWriter};
use crate::memory::{MemoryEntityCreator, MemorySelector, MemoryStore, MemoryWriter};
use std::sync::Arc;
use tracing::{debug, info};
use vitrum_core::{
    EntityCreator, EntityCreatorSupplier, PersistencyWriter, Selector, SelectorSupplier,
    WriterSupplier,
};

#[derive(Debug, Clone)]
enum Store {
    Memory(Arc<MemoryStore>),
    Fulltext(Arc<FulltextStore>),
}

/// Handle on an open backend
#[derive(Debug, Clone)]
pub struct Database {
    config: DatabaseConfig,
    store: Store,
}

impl Database {
    /// Open a fresh store for the configured backend
    pub fn open(config: DatabaseConfig) -> Self {
        let store = match config.backend {
            Backend::Memory => Store::Memory(Arc::new(MemoryStore::new())),
            Backend::Fulltext => Store::Fulltext(Arc::new(FulltextStore::new())),
        };
        info!(backend = config.backend.name(), batch_size = config.batch_size, "Opened database");
        Database { config, store }
    }

    /// Open a memory backend with default settings
    pub fn memory() -> Self {
        Self::open(DatabaseConfig::for_backend(Backend::Memory))
    }

    /// Open a fulltext backend with default settings
    pub fn fulltext() -> Self {
        Self::open(DatabaseConfig::for_backend(Backend::Fulltext))
    }

    /// Active configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Active backend
    pub fn backend(&self) -> Backend {
        self.config.backend
    }

    /// Default writer batch size
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Names of all entities in the store
    pub fn entity_names(&self) -> Vec<String> {
        match &self.store {
            Store::Memory(s) => s.entity_names(),
            Store::Fulltext(s) => s.entity_names(),
        }
    }

    /// Factory for selectors on this store
    pub fn selector_supplier(&self) -> SelectorSupplier {
        match &self.store {
            Store::Memory(s) => {
                let s = Arc::clone(s);
                Arc::new(move || Box::new(MemorySelector::new(Arc::clone(&s))) as Box<dyn Selector>)
            }
            Store::Fulltext(s) => {
                let s = Arc::clone(s);
                Arc::new(move || {
                    Box::new(FulltextSelector::new(Arc::clone(&s))) as Box<dyn Selector>
                })
            }
        }
    }

    /// Factory for writers on this store
    pub fn writer_supplier(&self) -> WriterSupplier {
        match &self.store {
            Store::Memory(s) => {
                let s = Arc::clone(s);
                Arc::new(move || {
                    Box::new(MemoryWriter::new(Arc::clone(&s))) as Box<dyn PersistencyWriter>
                })
            }
            Store::Fulltext(s) => {
                let s = Arc::clone(s);
                Arc::new(move || {
                    Box::new(FulltextWriter::new(Arc::clone(&s))) as Box<dyn PersistencyWriter>
                })
            }
        }
    }

    /// Factory for entity creators on this store
    pub fn entity_creator_supplier(&self) -> EntityCreatorSupplier {
        match &self.store {
            Store::Memory(s) => {
                let s = Arc::clone(s);
                Arc::new(move || {
                    Box::new(MemoryEntityCreator::new(Arc::clone(&s))) as Box<dyn EntityCreator>
                })
            }
            Store::Fulltext(s) => {
                let s = Arc::clone(s);
                Arc::new(move || {
                    Box::new(FulltextEntityCreator::new(Arc::clone(&s))) as Box<dyn EntityCreator>
                })
            }
        }
    }

    /// Compact every entity; a no-op on the memory backend
    pub fn optimize_entities(&self) {
        match &self.store {
            Store::Memory(_) => debug!("Memory backend has nothing to optimize"),
            Store::Fulltext(s) => s.optimize_all(),
        }
    }

    /// Fulltext store, when that backend is active
    pub fn fulltext_store(&self) -> Option<&Arc<FulltextStore>> {
        match &self.store {
            Store::Fulltext(s) => Some(s),
            Store::Memory(_) => None,
        }
    }
}
