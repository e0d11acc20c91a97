//! Ingest and query orchestration for vitrum
//!
//! This crate wires feature modules to storage:
//! - WorkerPool: fixed FIFO pool shared by extraction and import work
//! - ExtractionDispatcher: runs extractors over an item provider
//! - Item providers, segmenters and completion listeners
//! - DataImportHandler: parallel per-file import of precomputed descriptors
//! - IngestConfig: TOML run configuration
//! - RetrievalService: similarity queries, metadata lookup, entity setup
//!
//! Failures of a single item or file are logged and counted; only an
//! unusable configuration stops a run before it starts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod config;
pub mod dispatcher;
pub mod importer;
pub mod listener;
pub mod provider;
pub mod retrieval;

pub use background::{PoolStats, TaskHandle, WorkerPool};
pub use config::{ExtractionConfig, IngestConfig, InputConfig, DEFAULT_INPUT_DEPTH, DEFAULT_THREADS};
pub use dispatcher::{run_ingest, ExtractionDispatcher, ExtractionState, ExtractionStats, RunId};
pub use importer::{
    AudioTranscriptImportHandler, AudioTranscriptionImporter, CaptionDataImportHandler,
    CaptionTextImporter, DataImportHandler, DataImportRunner, ImportHandler, ImportSummary,
    Importer, IMPORT_WALK_DEPTH,
};
pub use listener::{CompletionListener, OptimizeEntitiesListener};
pub use provider::{
    ExtractionItem, ExtractionItemProvider, ItemSource, JsonSegmenter, Segmenter,
    TreeWalkPathProvider, VecItemProvider,
};
pub use retrieval::{CategoryResults, RetrievalService};
