//! Feature modules for vitrum
//!
//! A feature module computes descriptors at ingest time and answers
//! similarity queries over them. This crate provides:
//! - Extractor / Retriever: the two capability traits a module implements
//! - FulltextRetriever: caption, transcript and OCR text search
//! - VectorFeatureModule: color vector features with nearest-neighbour search
//! - FeatureRegistry: name -> capability factories

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod extractor;
pub mod registry;
pub mod retriever;
pub mod text;
pub mod vector;

pub use extractor::Extractor;
pub use registry::{ExtractorFactory, FeatureRegistry, RetrieverFactory};
pub use retriever::Retriever;
pub use text::{
    split_query_terms, FulltextRetriever, FuzzyEnricher, TermEnricher,
    AUDIO_TRANSCRIPTION_TABLE_NAME, DESCRIPTION_TEXT_TABLE_NAME, OCR_TABLE_NAME,
};
pub use vector::{AverageColor, SubDivAverageColor, VectorFeature, VectorFeatureModule};
