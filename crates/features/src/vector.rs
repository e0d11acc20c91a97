//! Vector feature modules
//!
//! A [`VectorFeature`] turns a segment into a fixed-length vector;
//! [`VectorFeatureModule`] handles persistence, nearest-neighbour retrieval
//! and scoring for it. Distances map to scores with `linear(max_distance)`.

use tracing::{debug, error, trace};
use vitrum_core::{
    create_entity_logged, drop_entity_logged, max_pool, score_pooled, AttributeDefinition,
    AttributeType, CorrespondenceFunction, Distance, EntityCreatorSupplier, FeatureDescriptor,
    PersistentOperator, PrimitiveValue, QueryConfig, RgbImage, ScoreElement, SegmentContainer,
    Selector, SelectorSupplier, VitrumError, VitrumResult, WriterSupplier, DISTANCE_FIELD,
    FEATURE_FIELD, ID_FIELD,
};
use vitrum_storage::BatchedWriter;

use crate::extractor::Extractor;
use crate::retriever::Retriever;

/// A fixed-length vector feature
pub trait VectorFeature: Send + Sync {
    /// Entity the vectors are stored in
    fn table_name(&self) -> &str;

    /// Vector length
    fn dimensions(&self) -> usize;

    /// Distance at which the score reaches zero
    fn max_distance(&self) -> f64;

    /// Distance used when the query does not ask for one
    fn default_distance(&self) -> Distance {
        Distance::Euclidean
    }

    /// Compute the vector, `None` when the segment lacks the input
    fn compute(&self, segment: &SegmentContainer) -> Option<Vec<f32>>;
}

// ============================================================================
// Color features
// ============================================================================

/// Mean color of the pixels in a rectangle, channels scaled to [0, 1]
fn mean_color(image: &RgbImage, x0: usize, y0: usize, x1: usize, y1: usize) -> [f32; 3] {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            if let Some(p) = image.pixel(x, y) {
                for c in 0..3 {
                    sum[c] += p[c] as u64;
                }
                count += 1;
            }
        }
    }
    if count == 0 {
        return [0.0; 3];
    }
    let mut mean = [0.0f32; 3];
    for c in 0..3 {
        mean[c] = sum[c] as f32 / count as f32 / 255.0;
    }
    mean
}

fn average_image(segment: &SegmentContainer) -> Option<&RgbImage> {
    segment
        .average_image
        .as_ref()
        .filter(|image| image.is_consistent())
}

/// Mean RGB color of the segment's average frame
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageColor;

impl VectorFeature for AverageColor {
    fn table_name(&self) -> &str {
        "features_AverageColor"
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn max_distance(&self) -> f64 {
        196.0 / 255.0
    }

    fn compute(&self, segment: &SegmentContainer) -> Option<Vec<f32>> {
        let image = average_image(segment)?;
        Some(mean_color(image, 0, 0, image.width, image.height).to_vec())
    }
}

/// Mean RGB color of each cell of a 2x2 grid over the average frame
#[derive(Debug, Clone, Copy, Default)]
pub struct SubDivAverageColor;

impl SubDivAverageColor {
    const DIVISIONS: usize = 2;
}

impl VectorFeature for SubDivAverageColor {
    fn table_name(&self) -> &str {
        "features_SubDivAverageColor"
    }

    fn dimensions(&self) -> usize {
        Self::DIVISIONS * Self::DIVISIONS * 3
    }

    fn max_distance(&self) -> f64 {
        2.0 / 4.0
    }

    fn default_distance(&self) -> Distance {
        Distance::Chisquared
    }

    fn compute(&self, segment: &SegmentContainer) -> Option<Vec<f32>> {
        let image = average_image(segment)?;
        let n = Self::DIVISIONS;
        let mut vector = Vec::with_capacity(self.dimensions());
        for gy in 0..n {
            for gx in 0..n {
                let x0 = gx * image.width / n;
                let x1 = (gx + 1) * image.width / n;
                let y0 = gy * image.height / n;
                let y1 = (gy + 1) * image.height / n;
                vector.extend_from_slice(&mean_color(image, x0, y0, x1, y1));
            }
        }
        Some(vector)
    }
}

// ============================================================================
// VectorFeatureModule
// ============================================================================

/// Feature module persisting and retrieving one [`VectorFeature`]
pub struct VectorFeatureModule<F: VectorFeature> {
    feature: F,
    writer: Option<BatchedWriter>,
    selector: Option<Box<dyn Selector>>,
}

impl<F: VectorFeature> VectorFeatureModule<F> {
    /// Wrap a feature
    pub fn new(feature: F) -> Self {
        VectorFeatureModule {
            feature,
            writer: None,
            selector: None,
        }
    }

    /// The wrapped feature
    pub fn feature(&self) -> &F {
        &self.feature
    }

    fn selector(&self) -> VitrumResult<&dyn Selector> {
        self.selector.as_deref().ok_or_else(|| {
            VitrumError::NotOpen(format!("retriever for '{}'", self.feature.table_name()))
        })
    }

    /// Nearest stored vectors to `query`, scored
    pub fn get_similar_vector(
        &self,
        query: &[f32],
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        let config = config.clone().with_distance_if_empty(self.feature.default_distance());
        let distance = config.distance.unwrap_or_else(|| self.feature.default_distance());
        let rows = match self.selector()?.get_nearest_neighbour_rows(
            config.results_per_module,
            query,
            FEATURE_FIELD,
            distance,
        ) {
            Ok(rows) => rows,
            Err(VitrumError::Unsupported(reason)) => {
                error!(entity = %self.feature.table_name(), reason = %reason, "Nearest neighbour lookup not supported");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        trace!(entity = %self.feature.table_name(), rows = rows.len(), "Retrieved nearest neighbours");

        let f = CorrespondenceFunction::linear(self.feature.max_distance());
        // Pool on the score so the best (closest) row per id wins
        let hits = rows.iter().filter_map(|row| {
            let id = row.get(ID_FIELD).and_then(PrimitiveValue::get_string)?;
            let d = row.get(DISTANCE_FIELD).and_then(PrimitiveValue::get_double)?;
            Some((id, f.apply(d)))
        });
        Ok(score_pooled(
            max_pool(hits),
            &CorrespondenceFunction::identity(),
            config.max_results,
        ))
    }
}

impl<F: VectorFeature> PersistentOperator for VectorFeatureModule<F> {
    fn initialize_persistent_layer(&self, supply: &EntityCreatorSupplier) {
        let fields = vec![
            AttributeDefinition::new(ID_FIELD, AttributeType::String),
            AttributeDefinition::vector(FEATURE_FIELD, self.feature.dimensions()),
        ];
        create_entity_logged(supply().as_ref(), self.feature.table_name(), &fields);
    }

    fn drop_persistent_layer(&self, supply: &EntityCreatorSupplier) {
        drop_entity_logged(supply().as_ref(), self.feature.table_name());
    }

    fn table_names(&self) -> Vec<String> {
        vec![self.feature.table_name().to_string()]
    }
}

impl<F: VectorFeature> Extractor for VectorFeatureModule<F> {
    fn init(&mut self, supply: &WriterSupplier, batch_size: usize) -> VitrumResult<()> {
        self.writer = Some(BatchedWriter::open(
            supply,
            self.feature.table_name(),
            batch_size,
        )?);
        Ok(())
    }

    fn process_segment(&mut self, segment: &SegmentContainer) -> VitrumResult<()> {
        let table = self.feature.table_name();
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| VitrumError::NotOpen(format!("extractor for '{}'", table)))?;
        if writer.id_exists(&segment.id)? {
            trace!(entity = %table, segment_id = %segment.id, "Descriptor exists, skipping");
            return Ok(());
        }
        match self.feature.compute(segment) {
            Some(vector) => writer.write(FeatureDescriptor::vector(segment.id.as_str(), vector).to_row()),
            None => {
                debug!(entity = %table, segment_id = %segment.id, "No average image, skipping segment");
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> VitrumResult<()> {
        self.writer.as_mut().map_or(Ok(()), BatchedWriter::flush)
    }

    fn finish(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                error!(entity = %self.feature.table_name(), error = %e, "Failed to close writer");
            }
        }
        if let Some(mut selector) = self.selector.take() {
            selector.close();
        }
    }
}

impl<F: VectorFeature> Retriever for VectorFeatureModule<F> {
    fn init(&mut self, supply: &SelectorSupplier) -> VitrumResult<()> {
        let mut selector = supply();
        selector.open(self.feature.table_name())?;
        self.selector = Some(selector);
        Ok(())
    }

    fn get_similar(
        &self,
        segment: &SegmentContainer,
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        match self.feature.compute(segment) {
            Some(query) => self.get_similar_vector(&query, config),
            None => {
                error!(entity = %self.feature.table_name(), "Query segment has no average image");
                Ok(Vec::new())
            }
        }
    }

    fn get_similar_to_id(
        &self,
        segment_id: &str,
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        let rows = self.selector()?.get_by_id(segment_id)?;
        let query = rows
            .iter()
            .find_map(|row| row.get(FEATURE_FIELD).and_then(PrimitiveValue::as_vector))
            .map(<[f32]>::to_vec);
        match query {
            Some(query) => self.get_similar_vector(&query, config),
            None => {
                error!(entity = %self.feature.table_name(), segment_id = %segment_id, "No stored vector for segment");
                Ok(Vec::new())
            }
        }
    }

    fn finish(&mut self) {
        Extractor::finish(self);
    }
}
