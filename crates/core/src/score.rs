//! Scoring model
//!
//! This module provides:
//! - ScoreElement: one ranked entity in a retrieval result
//! - CorrespondenceFunction: raw similarity/distance -> score
//! - max_pool: collapse several raw hits per entity to the best one
//! - rank: sort descending and apply an optional cap
//!
//! Scores from different correspondence functions are not comparable across
//! feature modules; fusing them is left to the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// ScoreElement
// ============================================================================

/// A scored entity (usually a segment id)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreElement {
    /// Id of the scored entity
    pub entity_id: String,
    /// Score, conceptually in [0, 1] but not clamped
    pub score: f64,
}

impl ScoreElement {
    /// Create a new score element
    pub fn new(entity_id: impl Into<String>, score: f64) -> Self {
        ScoreElement {
            entity_id: entity_id.into(),
            score,
        }
    }
}

// ============================================================================
// CorrespondenceFunction
// ============================================================================

/// Pure mapping from a raw similarity or distance to a score
///
/// Stateless and cheap to clone; constructed per retrieval call.
#[derive(Clone)]
pub struct CorrespondenceFunction {
    f: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
}

impl CorrespondenceFunction {
    /// Wrap an arbitrary one-argument function
    pub fn from_function(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        CorrespondenceFunction { f: Arc::new(f) }
    }

    /// Raw value is already a score
    pub fn identity() -> Self {
        Self::from_function(|x| x)
    }

    /// `max(0, 1 - d / max)`: linear falloff reaching zero at `max`
    pub fn linear(max: f64) -> Self {
        Self::from_function(move |d| (1.0 - d / max).max(0.0))
    }

    /// `1 / (1 + d / divisor)`: never reaches zero
    pub fn hyperbolic(divisor: f64) -> Self {
        Self::from_function(move |d| 1.0 / (1.0 + d / divisor))
    }

    /// Apply to one raw value
    pub fn apply(&self, raw: f64) -> f64 {
        (self.f)(raw)
    }
}

impl fmt::Debug for CorrespondenceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CorrespondenceFunction")
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Collapse raw hits to one value per entity, keeping the maximum
///
/// An entity hit twice keeps its single best raw score; hits never add up.
/// Pooling starts from 0, so negative or NaN raw scores pool to 0.
pub fn max_pool<I, S>(hits: I) -> HashMap<String, f64>
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
{
    let mut pooled: HashMap<String, f64> = HashMap::new();
    for (id, raw) in hits {
        let entry = pooled.entry(id.into()).or_insert(0.0);
        if raw > *entry {
            *entry = raw;
        }
    }
    pooled
}

/// Sort descending by score and truncate to `limit`
///
/// Ties keep their input order.
pub fn rank(mut elements: Vec<ScoreElement>, limit: Option<usize>) -> Vec<ScoreElement> {
    elements.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let Some(limit) = limit {
        elements.truncate(limit);
    }
    elements
}

/// Apply a correspondence function to pooled raw values and rank the result
pub fn score_pooled(
    pooled: HashMap<String, f64>,
    f: &CorrespondenceFunction,
    limit: Option<usize>,
) -> Vec<ScoreElement> {
    let elements = pooled
        .into_iter()
        .map(|(id, raw)| ScoreElement::new(id, f.apply(raw)))
        .collect();
    rank(elements, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear() {
        let f = CorrespondenceFunction::linear(2.0);
        assert_eq!(f.apply(0.0), 1.0);
        assert_eq!(f.apply(1.0), 0.5);
        assert_eq!(f.apply(5.0), 0.0);
    }

    #[test]
    fn test_hyperbolic() {
        let f = CorrespondenceFunction::hyperbolic(1.0);
        assert_eq!(f.apply(0.0), 1.0);
        assert_eq!(f.apply(1.0), 0.5);
    }

    #[test]
    fn test_max_pool_keeps_best() {
        let pooled = max_pool(vec![("a", 0.2), ("a", 0.9), ("b", 0.4), ("a", 0.5)]);
        assert_eq!(pooled.len(), 2);
        assert_eq!(pooled["a"], 0.9);
        assert_eq!(pooled["b"], 0.4);
    }

    #[test]
    fn test_max_pool_floors_at_zero() {
        let pooled = max_pool(vec![("a", -3.0), ("b", f64::NAN), ("b", -1.0), ("c", 0.3)]);
        assert_eq!(pooled["a"], 0.0);
        assert_eq!(pooled["b"], 0.0);
        assert_eq!(pooled["c"], 0.3);
    }

    #[test]
    fn test_rank_descending_and_limit() {
        let ranked = rank(
            vec![
                ScoreElement::new("a", 0.1),
                ScoreElement::new("b", 0.9),
                ScoreElement::new("c", 0.5),
            ],
            Some(2),
        );
        let ids: Vec<_> = ranked.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_score_pooled_empty() {
        let out = score_pooled(HashMap::new(), &CorrespondenceFunction::identity(), None);
        assert!(out.is_empty());
    }

    proptest! {
        #[test]
        fn prop_max_pool_equals_max(scores in prop::collection::vec(0.0f64..100.0, 1..20)) {
            let hits: Vec<_> = scores.iter().map(|s| ("entity", *s)).collect();
            let pooled = max_pool(hits);
            let expected = scores.iter().cloned().fold(f64::MIN, f64::max);
            prop_assert_eq!(pooled["entity"], expected);
        }

        #[test]
        fn prop_rank_is_sorted(scores in prop::collection::vec(-10.0f64..10.0, 0..30)) {
            let elements = scores
                .iter()
                .enumerate()
                .map(|(i, s)| ScoreElement::new(i.to_string(), *s))
                .collect();
            let ranked = rank(elements, None);
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
