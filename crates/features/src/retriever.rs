//! Retrieval capability
//!
//! The query half of a feature module.

use tracing::error;
use vitrum_core::{
    PersistentOperator, QueryConfig, ScoreElement, SegmentContainer, SelectorSupplier,
    VitrumResult,
};

/// Answers similarity queries against stored descriptors
///
/// Results are ranked descending by score. A module asked for a query shape
/// it does not implement returns an empty list and logs an error.
pub trait Retriever: PersistentOperator + Send {
    /// Acquire and open a selector
    fn init(&mut self, supply: &SelectorSupplier) -> VitrumResult<()>;

    /// Segments similar to the query segment
    ///
    /// Requests at most `config.results_per_module` raw rows from storage.
    fn get_similar(
        &self,
        segment: &SegmentContainer,
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>>;

    /// Segments similar to an already indexed segment
    fn get_similar_to_id(
        &self,
        segment_id: &str,
        _config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        error!(
            module = std::any::type_name::<Self>(),
            segment_id = %segment_id,
            "Similar to segment id is not supported by this module"
        );
        Ok(Vec::new())
    }

    /// Release the selector; idempotent
    fn finish(&mut self);
}
