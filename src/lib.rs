//! Vitrum - multimedia feature extraction and similarity retrieval
//!
//! Feature modules compute descriptors for media segments at ingest time and
//! answer similarity queries over them later. Storage is pluggable: modules
//! only ever see selector, writer and entity-creator suppliers.
//!
//! # Quick Start
//!
//! ```ignore
//! use vitrum::{Database, FeatureRegistry, QueryConfig, RetrievalService, SegmentContainer};
//!
//! let service = RetrievalService::new(Database::fulltext(), FeatureRegistry::with_defaults());
//! service.setup_entities();
//!
//! let hits = service.retrieve(
//!     "captions",
//!     &SegmentContainer::from_text("\"red car\" street"),
//!     &QueryConfig::default(),
//! )?;
//! ```
//!
//! # Architecture
//!
//! - `vitrum-core`: values, scoring, persistence contracts
//! - `vitrum-storage`: memory and fulltext backends
//! - `vitrum-features`: extractor/retriever modules and their registry
//! - `vitrum-engine`: worker pool, extraction dispatcher, importers, retrieval

pub use vitrum_core::{
    AttributeDefinition, AttributeType, CorrespondenceFunction, Distance, EntityCreator,
    FeatureDescriptor, MetadataEntry, PersistencyWriter, PersistentOperator, PrimitiveValue,
    QueryConfig, RgbImage, Row, ScoreElement, SegmentContainer, Selector, VitrumError,
    VitrumResult,
};
pub use vitrum_engine::{
    run_ingest, AudioTranscriptImportHandler, CaptionDataImportHandler, CompletionListener,
    ExtractionDispatcher, ExtractionItem, ExtractionItemProvider, ExtractionState,
    ExtractionStats, ImportHandler, ImportSummary, IngestConfig, JsonSegmenter,
    OptimizeEntitiesListener, RetrievalService, Segmenter, TreeWalkPathProvider,
    VecItemProvider, WorkerPool,
};
pub use vitrum_features::{
    AverageColor, Extractor, FeatureRegistry, FulltextRetriever, Retriever, SubDivAverageColor,
    VectorFeature, VectorFeatureModule,
};
pub use vitrum_storage::{Backend, BatchedWriter, Database, DatabaseConfig, MetadataReader, MetadataWriter};
