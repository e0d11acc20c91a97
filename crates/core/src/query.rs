//! Query configuration
//!
//! A [`QueryConfig`] is a read-only bag of options handed to every retriever
//! for one query. The core only interprets `results_per_module`; the distance
//! selector is consumed by concrete feature modules.

use serde::{Deserialize, Serialize};

/// Default cap on raw rows requested per feature module
pub const DEFAULT_RESULTS_PER_MODULE: usize = 250;

/// Distance used for nearest-neighbour lookups
///
/// Lower is closer for every variant. Correspondence functions turn the
/// distance into a score where higher is more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// L2 distance
    Euclidean,
    /// L1 distance
    Manhattan,
    /// Chi-squared histogram distance
    Chisquared,
    /// 1 - cosine similarity
    Cosine,
}

impl Distance {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            Distance::Euclidean => "euclidean",
            Distance::Manhattan => "manhattan",
            Distance::Chisquared => "chisquared",
            Distance::Cosine => "cosine",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Some(Distance::Euclidean),
            "manhattan" | "l1" => Some(Distance::Manhattan),
            "chisquared" | "chi2" => Some(Distance::Chisquared),
            "cosine" => Some(Distance::Cosine),
            _ => None,
        }
    }
}

/// Options for a single retrieval call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum raw rows fetched from storage per module
    #[serde(default = "default_results_per_module")]
    pub results_per_module: usize,
    /// Distance override; modules fall back to their own default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<Distance>,
    /// Optional cap on the final number of score elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

fn default_results_per_module() -> usize {
    DEFAULT_RESULTS_PER_MODULE
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            results_per_module: DEFAULT_RESULTS_PER_MODULE,
            distance: None,
            max_results: None,
        }
    }
}

impl QueryConfig {
    /// Create a config with a custom row cap
    pub fn new(results_per_module: usize) -> Self {
        QueryConfig {
            results_per_module,
            ..Self::default()
        }
    }

    /// Builder: set distance
    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Builder: set distance only when none was requested
    pub fn with_distance_if_empty(mut self, distance: Distance) -> Self {
        if self.distance.is_none() {
            self.distance = Some(distance);
        }
        self
    }

    /// Builder: set final result cap
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }
}
