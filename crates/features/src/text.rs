//! Fulltext retrieval modules
//!
//! One module shape backs every text feature (captions, transcripts, OCR):
//! an entity with an `id` and a `feature` text field, written at ingest time
//! from the segment text and searched at query time with free text.
//!
//! # Query pipeline
//!
//! 1. Split the query text into terms: quoted phrases stay whole, everything
//!    else splits on whitespace
//! 2. Let the module enrich each term (e.g. `term` -> `term~1`)
//! 3. Issue one fulltext lookup for all terms, capped at `results_per_module`
//! 4. Max-pool the raw scores per segment; hits never add up
//! 5. Score = `raw / term_count / 10`

use std::sync::Arc;
use tracing::{debug, error, trace};
use vitrum_core::{
    create_entity_logged, drop_entity_logged, max_pool, score_pooled, AttributeDefinition,
    AttributeType, CorrespondenceFunction, EntityCreatorSupplier, FeatureDescriptor,
    PersistentOperator, PrimitiveValue, QueryConfig, ScoreElement, SegmentContainer, Selector,
    SelectorSupplier, VitrumError, VitrumResult, WriterSupplier, FEATURE_FIELD, HANDLER_FULLTEXT,
    HINT_HANDLER, ID_FIELD, SCORE_FIELD,
};
use vitrum_storage::BatchedWriter;

use crate::extractor::Extractor;
use crate::retriever::Retriever;

/// Entity of the caption search module
pub const DESCRIPTION_TEXT_TABLE_NAME: &str = "features_captioning";

/// Entity of the audio transcription search module
pub const AUDIO_TRANSCRIPTION_TABLE_NAME: &str = "features_audiotranscription";

/// Entity of the OCR search module
pub const OCR_TABLE_NAME: &str = "features_ocr";

// ============================================================================
// Query terms
// ============================================================================

/// Split query text into terms
///
/// A quoted phrase with at least one character inside is kept whole,
/// quotes included. Other terms run to the next whitespace. A stray quote
/// is dropped.
pub fn split_query_terms(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    let mut terms = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' {
            let close = chars[i + 1..]
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, c)| **c == '"')
                .map(|(offset, _)| i + 1 + offset);
            match close {
                Some(end) => {
                    terms.push(chars[i..=end].iter().collect());
                    i = end + 1;
                }
                None => i += 1,
            }
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        terms.push(chars[start..i].iter().collect());
    }
    terms
}

/// Per-term rewrite applied before the lookup
pub trait TermEnricher: Send + Sync {
    /// Rewrite one term
    fn enrich(&self, term: &str) -> String;
}

/// Appends a fuzzy marker, `term` -> `term~N`
///
/// Phrases and terms already carrying an operator are left alone.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyEnricher {
    max_edits: usize,
}

impl FuzzyEnricher {
    /// Enricher allowing up to `max_edits` edits per term
    pub fn new(max_edits: usize) -> Self {
        FuzzyEnricher { max_edits }
    }
}

impl TermEnricher for FuzzyEnricher {
    fn enrich(&self, term: &str) -> String {
        if term.starts_with('"') || term.ends_with('*') || term.contains('~') {
            return term.to_string();
        }
        format!("{}~{}", term, self.max_edits)
    }
}

// ============================================================================
// FulltextRetriever
// ============================================================================

/// Text feature module over a fulltext entity
pub struct FulltextRetriever {
    table: String,
    enricher: Option<Arc<dyn TermEnricher>>,
    selector: Option<Box<dyn Selector>>,
    writer: Option<BatchedWriter>,
}

impl std::fmt::Debug for FulltextRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FulltextRetriever")
            .field("table", &self.table)
            .field("enriched", &self.enricher.is_some())
            .field("selector_open", &self.selector.is_some())
            .field("writer", &self.writer)
            .finish()
    }
}

impl FulltextRetriever {
    /// Module over a custom entity
    pub fn new(table: impl Into<String>) -> Self {
        FulltextRetriever {
            table: table.into(),
            enricher: None,
            selector: None,
            writer: None,
        }
    }

    /// Caption search
    pub fn description_text_search() -> Self {
        Self::new(DESCRIPTION_TEXT_TABLE_NAME)
    }

    /// Audio transcription search
    pub fn audio_transcription_search() -> Self {
        Self::new(AUDIO_TRANSCRIPTION_TABLE_NAME)
    }

    /// OCR search; terms are matched fuzzily with one edit
    pub fn ocr_search() -> Self {
        Self::new(OCR_TABLE_NAME).with_enricher(FuzzyEnricher::new(1))
    }

    /// Builder: set the term enricher
    pub fn with_enricher(mut self, enricher: impl TermEnricher + 'static) -> Self {
        self.enricher = Some(Arc::new(enricher));
        self
    }

    /// Name of the entity
    pub fn entity_name(&self) -> &str {
        &self.table
    }

    /// Schema: string id and text feature, both hinted to the fulltext handler
    pub fn attribute_definitions() -> Vec<AttributeDefinition> {
        vec![
            AttributeDefinition::new(ID_FIELD, AttributeType::String)
                .with_hint(HINT_HANDLER, HANDLER_FULLTEXT),
            AttributeDefinition::new(FEATURE_FIELD, AttributeType::Text)
                .with_hint(HINT_HANDLER, HANDLER_FULLTEXT),
        ]
    }

    /// Enriched query terms for free text
    pub fn query_terms(&self, text: &str) -> Vec<String> {
        split_query_terms(text)
            .into_iter()
            .map(|term| match &self.enricher {
                Some(e) => e.enrich(&term),
                None => term,
            })
            .collect()
    }

    /// Run prepared terms against the entity and score the hits
    pub fn get_similar_terms(
        &self,
        terms: &[String],
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let selector = self
            .selector
            .as_ref()
            .ok_or_else(|| VitrumError::NotOpen(format!("retriever for '{}'", self.table)))?;
        let rows =
            selector.get_fulltext_rows(config.results_per_module, FEATURE_FIELD, terms)?;
        trace!(entity = %self.table, rows = rows.len(), terms = ?terms, "Retrieved fulltext rows");

        let hits = rows.iter().filter_map(|row| {
            let id = row.get(ID_FIELD).and_then(PrimitiveValue::get_string)?;
            let raw = row.get(SCORE_FIELD).and_then(PrimitiveValue::get_double)?;
            Some((id, raw))
        });
        let term_count = terms.len() as f64;
        let f = CorrespondenceFunction::from_function(move |score| score / term_count / 10.0);
        Ok(score_pooled(max_pool(hits), &f, config.max_results))
    }
}

impl PersistentOperator for FulltextRetriever {
    fn initialize_persistent_layer(&self, supply: &EntityCreatorSupplier) {
        create_entity_logged(supply().as_ref(), &self.table, &Self::attribute_definitions());
    }

    fn drop_persistent_layer(&self, supply: &EntityCreatorSupplier) {
        drop_entity_logged(supply().as_ref(), &self.table);
    }

    fn table_names(&self) -> Vec<String> {
        vec![self.table.clone()]
    }
}

impl Extractor for FulltextRetriever {
    fn init(&mut self, supply: &WriterSupplier, batch_size: usize) -> VitrumResult<()> {
        self.writer = Some(BatchedWriter::open(supply, &self.table, batch_size)?);
        Ok(())
    }

    /// Persist the segment text; segments without text are skipped
    fn process_segment(&mut self, segment: &SegmentContainer) -> VitrumResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| VitrumError::NotOpen(format!("extractor for '{}'", self.table)))?;
        match segment.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                writer.write(FeatureDescriptor::text(segment.id.as_str(), text).to_row())
            }
            _ => {
                debug!(entity = %self.table, segment_id = %segment.id, "No text, skipping segment");
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
                error!(entity = %self.table, error = %e, "Failed to close writer");
            }
        }
        if let Some(mut selector) = self.selector.take() {
            selector.close();
        }
    }
}

impl Retriever for FulltextRetriever {
    fn init(&mut self, supply: &SelectorSupplier) -> VitrumResult<()> {
        let mut selector = supply();
        selector.open(&self.table)?;
        self.selector = Some(selector);
        Ok(())
    }

    fn get_similar(
        &self,
        segment: &SegmentContainer,
        config: &QueryConfig,
    ) -> VitrumResult<Vec<ScoreElement>> {
        let terms = self.query_terms(segment.text());
        self.get_similar_terms(&terms, config)
    }

    fn finish(&mut self) {
        Extractor::finish(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_terms() {
        assert_eq!(split_query_terms("  red   car "), vec!["red", "car"]);
        assert!(split_query_terms("   ").is_empty());
    }

    #[test]
    fn test_split_keeps_phrases() {
        assert_eq!(
            split_query_terms("\"red car\" on \"the street\""),
            vec!["\"red car\"", "on", "\"the street\""]
        );
    }

    #[test]
    fn test_split_stray_quotes() {
        assert_eq!(split_query_terms("\"open phrase"), vec!["open", "phrase"]);
        assert_eq!(split_query_terms("\"\" x"), vec!["x"]);
    }

    #[test]
    fn test_fuzzy_enricher() {
        let e = FuzzyEnricher::new(1);
        assert_eq!(e.enrich("stop"), "stop~1");
        assert_eq!(e.enrich("\"no exit\""), "\"no exit\"");
        assert_eq!(e.enrich("sto*"), "sto*");
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            FulltextRetriever::description_text_search().table_names(),
            vec![DESCRIPTION_TEXT_TABLE_NAME]
        );
        assert_eq!(
            FulltextRetriever::audio_transcription_search().entity_name(),
            AUDIO_TRANSCRIPTION_TABLE_NAME
        );
        let ocr = FulltextRetriever::ocr_search();
        assert_eq!(ocr.entity_name(), OCR_TABLE_NAME);
        assert_eq!(ocr.query_terms("exit sign"), vec!["exit~1", "sign~1"]);
        assert_eq!(
            FulltextRetriever::description_text_search().query_terms("exit sign"),
            vec!["exit", "sign"]
        );
    }

    #[test]
    fn test_schema_hints() {
        let defs = FulltextRetriever::attribute_definitions();
        assert!(defs.iter().all(|d| d.prefers_fulltext_handler()));
        assert!(defs[1].is_fulltext());
        assert!(!defs[0].is_fulltext());
    }

    #[test]
    fn test_unopened_retriever_errors() {
        let module = FulltextRetriever::description_text_search();
        let err = module
            .get_similar_terms(&["dog".to_string()], &QueryConfig::default())
            .unwrap_err();
        assert!(matches!(err, VitrumError::NotOpen(_)));
        assert!(module
            .get_similar(&SegmentContainer::from_text("   "), &QueryConfig::default())
            .unwrap()
            .is_empty());
    }
}
