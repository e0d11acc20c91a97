//! Storage backends for vitrum
//!
//! This crate implements the persistence contracts of `vitrum-core` with:
//! - memory: row store with brute-force nearest neighbour and a text scan
//! - fulltext: segmented inverted index with BM25, phrase and fuzzy terms
//! - BatchedWriter: buffered writes over any `PersistencyWriter`
//! - MetadataWriter / MetadataReader: metadata entity access
//! - Database: opens a backend and hands out selector/writer/creator suppliers
//!
//! Feature modules only ever see the suppliers, so the same module code runs
//! against either backend.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod dao;
pub mod database;
pub mod distance;
pub mod fulltext;
pub mod memory;
mod validate;

pub use batch::BatchedWriter;
pub use config::{Backend, DatabaseConfig, DEFAULT_BATCH_SIZE};
pub use dao::{MetadataReader, MetadataWriter};
pub use database::Database;
pub use fulltext::{FulltextEntityCreator, FulltextSelector, FulltextStore, FulltextWriter};
pub use memory::{MemoryEntityCreator, MemorySelector, MemoryStore, MemoryWriter};
