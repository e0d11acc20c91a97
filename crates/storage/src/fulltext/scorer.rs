//! BM25 relevance for the fulltext index
//!
//! For each matched term t:
//! score += IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl/avgdl))
//!
//! Where:
//! - tf = matches of the clause in the field
//! - dl = field length in tokens
//! - avgdl = average field length over all indexed documents
//! - k1 = term saturation parameter (default 1.2)
//! - b = length normalization parameter (default 0.75)

/// Corpus-level statistics for one field, gathered across all segments
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldStats {
    /// Documents carrying the field
    pub total_docs: usize,
    /// Average field length in tokens
    pub avg_doc_len: f32,
}

impl FieldStats {
    /// Compute IDF for a document frequency
    ///
    /// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
    pub fn idf(&self, df: usize) -> f32 {
        let n = self.total_docs as f32;
        let df = df as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

/// BM25 scorer
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    k1: f32,
    b: f32,
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Bm25Scorer { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Scorer {
    /// Create a scorer with custom parameters
    pub fn new(k1: f32, b: f32) -> Self {
        Bm25Scorer { k1, b }
    }

    /// Contribution of one clause to a document's score
    pub fn term_score(&self, tf: u32, idf: f32, doc_len: u32, stats: &FieldStats) -> f32 {
        if tf == 0 {
            return 0.0;
        }
        let tf = tf as f32;
        let avg_len = stats.avg_doc_len.max(1.0);
        let tf_component =
            (tf * (self.k1 + 1.0)) / (tf + self.k1 * (1.0 - self.b + self.b * doc_len as f32 / avg_len));
        idf * tf_component
    }
}
