//! Core types and traits for vitrum
//!
//! This crate defines the foundational types used throughout the system:
//! - PrimitiveValue: tagged cell type returned by every storage read
//! - MetadataEntry: key/value fact about a media object
//! - FeatureDescriptor: persisted output of a feature module for a segment
//! - ScoreElement, CorrespondenceFunction: the scoring model
//! - QueryConfig, Distance: per-query options
//! - AttributeDefinition: entity schema declarations
//! - SegmentContainer: the unit feature modules process
//! - Traits: persistence contracts (EntityCreator, Selector, PersistencyWriter)
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod metadata;
pub mod query;
pub mod schema;
pub mod score;
pub mod segment;
pub mod traits;
pub mod value;

pub use descriptor::FeatureDescriptor;
pub use error::{VitrumError, VitrumResult};
pub use metadata::{MetadataEntry, METADATA_ENTITY, METADATA_FIELDS};
pub use query::{Distance, QueryConfig, DEFAULT_RESULTS_PER_MODULE};
pub use schema::{AttributeDefinition, AttributeType, HANDLER_FULLTEXT, HINT_HANDLER};
pub use score::{max_pool, rank, score_pooled, CorrespondenceFunction, ScoreElement};
pub use segment::{RgbImage, SegmentContainer};
pub use traits::{
    create_entity_logged, drop_entity_logged, EntityCreator, EntityCreatorSupplier,
    PersistencyWriter, PersistentOperator, Row, Selector, SelectorSupplier, WriterSupplier,
    DISTANCE_FIELD, FEATURE_FIELD, ID_FIELD, SCORE_FIELD,
};
pub use value::{PrimitiveValue, ProviderDataType};
