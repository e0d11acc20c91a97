//! Segmented inverted index for one entity
//!
//! Every persisted batch becomes an immutable segment holding the stored
//! rows and, for each text field, a term dictionary with positional postings.
//! Scoring always uses statistics gathered across all segments, so results
//! do not depend on how rows were batched. `optimize` merges all segments
//! into one.

use super::query::TermQuery;
use super::scorer::{Bm25Scorer, FieldStats};
use super::tokenizer::tokenize;
use crate::validate::validate_row;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use vitrum_core::{
    AttributeDefinition, PrimitiveValue, Row, VitrumError, VitrumResult, ID_FIELD, SCORE_FIELD,
};

// ============================================================================
// Segment
// ============================================================================

/// Occurrences of one term in one document
#[derive(Debug, Clone)]
struct Posting {
    doc: u32,
    positions: Vec<u32>,
}

/// Postings for one text field within a segment
#[derive(Debug, Default)]
struct FieldIndex {
    /// term -> postings, ordered by doc
    terms: BTreeMap<String, Vec<Posting>>,
    /// doc -> length in tokens, only for docs carrying the field
    doc_lens: HashMap<u32, u32>,
}

impl FieldIndex {
    fn add(&mut self, doc: u32, text: &str) {
        let tokens = tokenize(text);
        self.doc_lens.insert(doc, tokens.len() as u32);
        let mut by_term: HashMap<String, Vec<u32>> = HashMap::new();
        for (position, token) in tokens.into_iter().enumerate() {
            by_term.entry(token).or_default().push(position as u32);
        }
        for (term, positions) in by_term {
            self.terms
                .entry(term)
                .or_default()
                .push(Posting { doc, positions });
        }
    }

    fn postings(&self, term: &str) -> &[Posting] {
        self.terms.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    fn doc_len(&self, doc: u32) -> u32 {
        self.doc_lens.get(&doc).copied().unwrap_or(0)
    }

    /// Dictionary terms a single-token clause expands to
    fn expand<'a>(&'a self, query: &TermQuery) -> Vec<&'a str> {
        match query {
            TermQuery::Term(t) => self
                .terms
                .get_key_value(t.as_str())
                .map(|(k, _)| vec![k.as_str()])
                .unwrap_or_default(),
            TermQuery::Prefix(p) => self
                .terms
                .range(p.clone()..)
                .take_while(|(k, _)| k.starts_with(p.as_str()))
                .map(|(k, _)| k.as_str())
                .collect(),
            TermQuery::Fuzzy { .. } => self
                .terms
                .keys()
                .filter(|k| query.matches_token(k))
                .map(String::as_str)
                .collect(),
            TermQuery::Phrase(_) | TermQuery::Empty => Vec::new(),
        }
    }

    /// doc -> number of phrase occurrences
    fn phrase_counts(&self, phrase: &[String]) -> HashMap<u32, u32> {
        let mut counts = HashMap::new();
        let Some((first, rest)) = phrase.split_first() else {
            return counts;
        };
        let rest: Vec<HashMap<u32, &Vec<u32>>> = rest
            .iter()
            .map(|t| {
                self.postings(t)
                    .iter()
                    .map(|p| (p.doc, &p.positions))
                    .collect()
            })
            .collect();
        for posting in self.postings(first) {
            let tf = posting
                .positions
                .iter()
                .filter(|start| {
                    rest.iter().enumerate().all(|(offset, by_doc)| {
                        by_doc.get(&posting.doc).is_some_and(|positions| {
                            positions.binary_search(&(**start + offset as u32 + 1)).is_ok()
                        })
                    })
                })
                .count() as u32;
            if tf > 0 {
                counts.insert(posting.doc, tf);
            }
        }
        counts
    }
}

/// Immutable batch of stored rows plus their postings
#[derive(Debug, Default)]
struct Segment {
    docs: Vec<Row>,
    fields: HashMap<String, FieldIndex>,
}

impl Segment {
    fn build(rows: Vec<Row>, text_fields: &[String]) -> Self {
        let mut fields: HashMap<String, FieldIndex> = text_fields
            .iter()
            .map(|f| (f.clone(), FieldIndex::default()))
            .collect();
        for (doc, row) in rows.iter().enumerate() {
            for (name, index) in fields.iter_mut() {
                if let Some(text) = row.get(name).and_then(PrimitiveValue::as_str) {
                    index.add(doc as u32, text);
                }
            }
        }
        Segment { docs: rows, fields }
    }
}

// ============================================================================
// FulltextIndex
// ============================================================================

/// Segment list and id set; always updated together
#[derive(Debug, Default)]
struct IndexState {
    segments: Vec<Arc<Segment>>,
    ids: HashSet<String>,
}

/// Inverted index plus stored rows for one entity
///
/// # Thread Safety
///
/// Segments are immutable and shared through `Arc`. Readers snapshot the
/// segment list; writers append a segment and its ids under one write lock.
#[derive(Debug)]
pub struct FulltextIndex {
    name: String,
    schema: Vec<AttributeDefinition>,
    text_fields: Vec<String>,
    state: RwLock<IndexState>,
    scorer: Bm25Scorer,
}

impl FulltextIndex {
    /// Create an empty index for an entity schema
    pub fn new(name: &str, schema: Vec<AttributeDefinition>) -> Self {
        let text_fields = schema
            .iter()
            .filter(|f| f.is_fulltext())
            .map(|f| f.name.clone())
            .collect();
        FulltextIndex {
            name: name.to_string(),
            schema,
            text_fields,
            state: RwLock::new(IndexState::default()),
            scorer: Bm25Scorer::default(),
        }
    }

    /// Number of stored rows
    pub fn doc_count(&self) -> usize {
        self.state.read().segments.iter().map(|s| s.docs.len()).sum()
    }

    /// Number of segments
    pub fn segment_count(&self) -> usize {
        self.state.read().segments.len()
    }

    /// Validate and index a batch as a new segment
    pub fn add_batch(&self, rows: Vec<Row>) -> VitrumResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for row in &rows {
            validate_row(&self.name, &self.schema, row)?;
        }
        let new_ids: Vec<String> = rows
            .iter()
            .filter_map(|r| r.get(ID_FIELD).and_then(PrimitiveValue::get_string))
            .collect();
        let segment = Arc::new(Segment::build(rows, &self.text_fields));
        let mut state = self.state.write();
        state.segments.push(segment);
        state.ids.extend(new_ids);
        Ok(())
    }

    /// Merge all segments into one, returning how many were merged
    pub fn optimize(&self) -> usize {
        let mut state = self.state.write();
        let segments = &mut state.segments;
        let merged = segments.len();
        if merged <= 1 {
            return merged;
        }
        let rows: Vec<Row> = segments.iter().flat_map(|s| s.docs.iter().cloned()).collect();
        *segments = vec![Arc::new(Segment::build(rows, &self.text_fields))];
        merged
    }

    /// Whether a row with this id was indexed
    pub fn id_exists(&self, id: &str) -> bool {
        self.state.read().ids.contains(id)
    }

    fn snapshot(&self) -> Vec<Arc<Segment>> {
        self.state.read().segments.clone()
    }

    /// Stored rows whose `field` equals any of `values`
    pub fn rows_matching(&self, field: &str, values: &[PrimitiveValue]) -> Vec<Row> {
        self.snapshot()
            .iter()
            .flat_map(|s| s.docs.iter())
            .filter(|row| row.get(field).is_some_and(|v| values.contains(v)))
            .cloned()
            .collect()
    }

    /// All stored rows in insertion order
    pub fn all_rows(&self) -> Vec<Row> {
        self.snapshot()
            .iter()
            .flat_map(|s| s.docs.iter().cloned())
            .collect()
    }

    fn field_stats(segments: &[Arc<Segment>], field: &str) -> FieldStats {
        let mut total_docs = 0usize;
        let mut total_len = 0u64;
        for index in segments.iter().filter_map(|s| s.fields.get(field)) {
            total_docs += index.doc_lens.len();
            total_len += index.doc_lens.values().map(|l| *l as u64).sum::<u64>();
        }
        FieldStats {
            total_docs,
            avg_doc_len: if total_docs == 0 {
                0.0
            } else {
                total_len as f32 / total_docs as f32
            },
        }
    }

    /// BM25-ranked rows for all clauses against one text field
    ///
    /// Clause scores add up per document. Each returned row is the stored
    /// row with its relevance in [`SCORE_FIELD`].
    pub fn search(&self, field: &str, queries: &[TermQuery], limit: usize) -> VitrumResult<Vec<Row>> {
        if !self.text_fields.iter().any(|f| f == field) {
            return Err(VitrumError::unsupported(format!(
                "Field '{}' of entity '{}' is not fulltext indexed",
                field, self.name
            )));
        }
        if limit == 0 || queries.is_empty() {
            return Ok(Vec::new());
        }

        let segments = self.snapshot();
        let stats = Self::field_stats(&segments, field);
        let indices: Vec<Option<&FieldIndex>> =
            segments.iter().map(|s| s.fields.get(field)).collect();
        let mut scores: HashMap<(usize, u32), f32> = HashMap::new();

        for query in queries {
            match query {
                TermQuery::Empty => {}
                TermQuery::Phrase(phrase) => {
                    let idf: f32 = phrase
                        .iter()
                        .map(|t| {
                            let df = indices.iter().flatten().map(|i| i.postings(t).len()).sum();
                            stats.idf(df)
                        })
                        .sum();
                    for (seg, index) in indices.iter().enumerate() {
                        let Some(index) = index else { continue };
                        for (doc, tf) in index.phrase_counts(phrase) {
                            *scores.entry((seg, doc)).or_insert(0.0) +=
                                self.scorer.term_score(tf, idf, index.doc_len(doc), &stats);
                        }
                    }
                }
                _ => {
                    let expanded: HashSet<&str> = indices
                        .iter()
                        .flatten()
                        .flat_map(|i| i.expand(query))
                        .collect();
                    for term in expanded {
                        let df = indices.iter().flatten().map(|i| i.postings(term).len()).sum();
                        let idf = stats.idf(df);
                        for (seg, index) in indices.iter().enumerate() {
                            let Some(index) = index else { continue };
                            for posting in index.postings(term) {
                                *scores.entry((seg, posting.doc)).or_insert(0.0) += self.scorer.term_score(
                                    posting.positions.len() as u32,
                                    idf,
                                    index.doc_len(posting.doc),
                                    &stats,
                                );
                            }
                        }
                    }
                }
            }
        }

        let mut ranked: Vec<((usize, u32), f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|((seg, doc), score)| {
                let mut row = segments[seg].docs[doc as usize].clone();
                row.insert(SCORE_FIELD.to_string(), PrimitiveValue::Float(score));
                row
            })
            .collect())
    }
}
