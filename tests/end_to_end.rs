//! End-to-end tests through the public facade
//!
//! Extract color features for an in-memory corpus, then query them by
//! example, by stored id and by category.

use std::sync::Arc;
use vitrum::{
    Database, ExtractionDispatcher, ExtractionItem, ExtractionState, FeatureRegistry,
    IngestConfig, QueryConfig, RetrievalService, RgbImage, SegmentContainer, VecItemProvider,
};

fn colored(id: &str, object: &str, color: [u8; 3]) -> SegmentContainer {
    SegmentContainer::new(id, object)
        .with_average_image(RgbImage::filled(8, 8, color))
        .with_text(format!("segment {id}"))
}

fn corpus() -> Vec<ExtractionItem> {
    vec![
        ExtractionItem::from_segments(
            "sunset",
            vec![
                colored("sunset_1", "sunset", [250, 120, 20]),
                colored("sunset_2", "sunset", [230, 90, 30]),
            ],
        ),
        ExtractionItem::from_segments("sea", vec![colored("sea_1", "sea", [10, 60, 200])]),
        ExtractionItem::from_segments("forest", vec![colored("forest_1", "forest", [20, 140, 30])]),
    ]
}

fn extract(db: &Database) {
    let registry = FeatureRegistry::with_defaults();
    let config = IngestConfig::for_features(&["average_color", "subdiv_average_color", "captions"])
        .with_threads(2);
    let mut dispatcher = ExtractionDispatcher::new();
    assert!(dispatcher.initialize(
        Arc::new(VecItemProvider::new(corpus())),
        &config,
        &registry,
        db
    ));
    assert!(dispatcher.start());
    assert_eq!(dispatcher.block(), ExtractionState::Completed);
    assert_eq!(dispatcher.stats().segments_processed, 4);
}

#[test]
fn color_query_by_example_and_by_id() {
    let db = Database::memory();
    extract(&db);
    let service = RetrievalService::new(db, FeatureRegistry::with_defaults())
        .with_category("color", &["average_color", "subdiv_average_color"]);

    let query = SegmentContainer::new("q", "").with_average_image(RgbImage::filled(4, 4, [245, 110, 25]));
    let hits = service
        .retrieve("average_color", &query, &QueryConfig::default())
        .unwrap();
    assert!(hits[0].entity_id.starts_with("sunset_"));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let similar = service
        .more_like_this("subdiv_average_color", "sea_1", &QueryConfig::default())
        .unwrap();
    assert_eq!(similar[0].entity_id, "sea_1");

    let by_category = service
        .retrieve_category("color", &query, &QueryConfig::new(2))
        .unwrap();
    assert_eq!(by_category.len(), 2);
    for hits in by_category.values() {
        assert!(hits.len() <= 2);
        assert!(hits[0].entity_id.starts_with("sunset_"));
    }
}

#[test]
fn color_features_are_unsupported_on_fulltext_backend() {
    let db = Database::fulltext();
    extract(&db);
    let service = RetrievalService::new(db, FeatureRegistry::with_defaults());
    let query = SegmentContainer::new("q", "").with_average_image(RgbImage::filled(4, 4, [0, 0, 0]));
    assert!(service
        .retrieve("average_color", &query, &QueryConfig::default())
        .unwrap()
        .is_empty());

    let text = service
        .retrieve("captions", &SegmentContainer::from_text("forest"), &QueryConfig::default())
        .unwrap();
    assert_eq!(text.len(), 1);
}
