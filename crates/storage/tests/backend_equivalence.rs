//! Backend Equivalence Tests
//!
//! The same writes must be observable the same way through both backends:
//!
//! - Point lookups return the same rows
//! - A single-term fulltext query matches the same set of ids
//! - Metadata entries round-trip with `exists = true` and identical fields

use proptest::prelude::*;
use std::collections::BTreeSet;
use vitrum_core::{
    AttributeDefinition, AttributeType, FeatureDescriptor, MetadataEntry, PrimitiveValue,
    FEATURE_FIELD, ID_FIELD,
};
use vitrum_storage::{Database, MetadataReader, MetadataWriter};

fn text_schema() -> Vec<AttributeDefinition> {
    vec![
        AttributeDefinition::new(ID_FIELD, AttributeType::String),
        AttributeDefinition::new(FEATURE_FIELD, AttributeType::Text),
    ]
}

fn populate(db: &Database, docs: &[(String, String)]) {
    let creator = (db.entity_creator_supplier())();
    creator.create_entity("captions", &text_schema()).unwrap();
    let mut writer = (db.writer_supplier())();
    writer.open("captions").unwrap();
    writer
        .persist_batch(
            docs.iter()
                .map(|(id, text)| FeatureDescriptor::text(id.as_str(), text.as_str()).to_row())
                .collect(),
        )
        .unwrap();
}

fn matching_ids(db: &Database, term: &str) -> BTreeSet<String> {
    let mut selector = (db.selector_supplier())();
    selector.open("captions").unwrap();
    selector
        .get_fulltext_rows(1000, FEATURE_FIELD, &[term.to_string()])
        .unwrap()
        .iter()
        .filter_map(|r| r.get(ID_FIELD).and_then(PrimitiveValue::get_string))
        .collect()
}

// ============================================================================
// Fixed corpus
// ============================================================================

#[test]
fn fulltext_match_sets_agree() {
    let docs: Vec<(String, String)> = [
        ("s1", "a red car parked on the street"),
        ("s2", "a blue car"),
        ("s3", "people walking on the beach"),
        ("s4", "the red carpet"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();

    let memory = Database::memory();
    let fulltext = Database::fulltext();
    populate(&memory, &docs);
    populate(&fulltext, &docs);

    for term in ["car", "red", "\"red car\"", "car*", "beach~1", "nothing"] {
        assert_eq!(
            matching_ids(&memory, term),
            matching_ids(&fulltext, term),
            "term {term}"
        );
    }
    assert_eq!(
        matching_ids(&fulltext, "car*"),
        ["s1", "s2", "s4"].iter().map(|s| s.to_string()).collect()
    );
}

#[test]
fn point_lookups_agree() {
    let docs = vec![
        ("s1".to_string(), "one".to_string()),
        ("s2".to_string(), "two".to_string()),
    ];
    for db in [Database::memory(), Database::fulltext()] {
        populate(&db, &docs);
        let mut selector = (db.selector_supplier())();
        selector.open("captions").unwrap();
        let rows = selector.get_by_id("s2").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][FEATURE_FIELD], PrimitiveValue::from("two"));
        assert!(selector.get_by_id("s3").unwrap().is_empty());
        assert_eq!(selector.get_all().unwrap().len(), 2);
    }
}

// ============================================================================
// Properties
// ============================================================================

fn word() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["dog", "cat", "bird", "tree", "car", "road"]).prop_map(String::from)
}

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..6).prop_map(|w| w.join(" "))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn single_term_matches_agree(texts in prop::collection::vec(sentence(), 1..12), term in word()) {
        let docs: Vec<(String, String)> = texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| (format!("s{i}"), t))
            .collect();
        let memory = Database::memory();
        let fulltext = Database::fulltext();
        populate(&memory, &docs);
        populate(&fulltext, &docs);

        let expected: BTreeSet<String> = docs
            .iter()
            .filter(|(_, t)| t.split(' ').any(|w| w == term))
            .map(|(id, _)| id.clone())
            .collect();
        prop_assert_eq!(matching_ids(&memory, &term), expected.clone());
        prop_assert_eq!(matching_ids(&fulltext, &term), expected);
    }

    #[test]
    fn metadata_round_trips(
        object_id in "[a-z0-9]{1,12}",
        domain in "[A-Z]{2,6}",
        key in "[A-Za-z]{1,10}",
        value in prop_oneof![
            "[ -~]{0,20}".prop_map(PrimitiveValue::String),
            any::<i32>().prop_map(PrimitiveValue::Int),
            any::<i64>().prop_map(PrimitiveValue::Long),
        ],
    ) {
        for db in [Database::memory(), Database::fulltext()] {
            (db.entity_creator_supplier())().create_metadata_entity().unwrap();
            let entry = MetadataEntry::of(object_id.clone(), domain.clone(), key.clone(), value.clone());
            prop_assert!(!entry.exists());

            let mut writer = MetadataWriter::open(&db.writer_supplier(), 10).unwrap();
            writer.write(&entry).unwrap();
            writer.close().unwrap();

            let reader = MetadataReader::open(&db.selector_supplier()).unwrap();
            let found = reader.lookup(&[object_id.clone()], &[domain.clone()]).unwrap();
            prop_assert_eq!(found.len(), 1);
            prop_assert!(found[0].exists());
            prop_assert_eq!(found[0].key(), key.as_str());
            prop_assert_eq!(found[0].domain(), domain.as_str());
            prop_assert_eq!(found[0].value_provider(), &value);
        }
    }
}

#[test]
fn unsupported_metadata_value_degrades_to_nothing() {
    let db = Database::memory();
    (db.entity_creator_supplier())()
        .create_metadata_entity()
        .unwrap();
    let entry = MetadataEntry::from_json("o1", "exif", "Flash", &serde_json::json!(true));
    assert_eq!(entry.value(), None);

    let mut writer = MetadataWriter::open(&db.writer_supplier(), 1).unwrap();
    writer.write(&entry).unwrap();
    writer.close().unwrap();

    let reader = MetadataReader::open(&db.selector_supplier()).unwrap();
    let found = reader.lookup(&["o1".to_string()], &[]).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value(), None);
    assert_eq!(found[0].value_provider(), &PrimitiveValue::Nothing);
}
