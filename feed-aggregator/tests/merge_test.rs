mod common;

use common::{classification, environment, item, source_ids, video};
use feed_aggregator::{ContentType, Item, MergeEngine, SortOrder, SourcePriority};
use serde_json::json;
use std::cmp::Ordering;

fn desc() -> MergeEngine {
    MergeEngine::new(SortOrder::Desc, SourcePriority::default())
}

fn sample() -> Vec<Item> {
    vec![
        item(ContentType::Classifications, classification("c1", "2024-05-21T10:00:00Z", "Apis mellifera", 0.91)),
        item(ContentType::Classifications, classification("c2", "2024-05-21T08:00:00Z", "Bombus terrestris", 0.75)),
        item(ContentType::Environment, environment("e1", "2024-05-21T09:30:00Z", 21.5)),
        item(ContentType::Videos, video("v1", "2024-05-21T07:15:00Z", 30.0)),
    ]
}

#[test]
fn test_merge_orders_newest_first() {
    let merged = desc().merge_and_sort(Vec::new(), sample());
    assert_eq!(source_ids(&merged), vec!["c1", "e1", "c2", "v1"]);
}

#[test]
fn test_ascending_is_the_exact_reverse() {
    let newest_first = desc().merge_and_sort(Vec::new(), sample());
    let oldest_first =
        MergeEngine::new(SortOrder::Asc, SourcePriority::default()).merge_and_sort(Vec::new(), sample());

    let mut reversed = source_ids(&newest_first);
    reversed.reverse();
    assert_eq!(source_ids(&oldest_first), reversed);
}

#[test]
fn test_duplicates_keep_first_occurrence() {
    let existing = vec![item(
        ContentType::Classifications,
        json!({ "id": "c1", "timestamp": "2024-05-21T10:00:00Z", "species": "Apis mellifera" }),
    )];
    let incoming = vec![item(
        ContentType::Classifications,
        json!({ "id": "c1", "timestamp": "2024-05-21T10:00:00Z", "species": "Vespa crabro" }),
    )];

    let merged = desc().merge_and_sort(existing, incoming);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].str_field(&["species"]), Some("Apis mellifera"));
}

#[test]
fn test_merge_is_idempotent() {
    let engine = desc();
    let once = engine.merge_and_sort(Vec::new(), sample());
    let twice = engine.merge_and_sort(once.clone(), sample());
    assert_eq!(once, twice);

    let doubled = engine.merge_and_sort(sample(), sample());
    assert_eq!(doubled.len(), sample().len());
}

#[test]
fn test_same_id_different_type_are_distinct() {
    let merged = desc().merge_and_sort(
        vec![item(ContentType::Videos, video("x", "2024-05-21T10:00:00Z", 5.0))],
        vec![item(ContentType::Environment, environment("x", "2024-05-21T10:00:00Z", 19.0))],
    );
    assert_eq!(merged.len(), 2);
}

#[test]
fn test_equal_timestamps_follow_source_priority() {
    let ts = "2024-05-21T12:00:00Z";
    let items = vec![
        item(ContentType::Videos, video("v", ts, 10.0)),
        item(ContentType::Environment, environment("e", ts, 20.0)),
        item(ContentType::Classifications, classification("c", ts, "Apis", 0.5)),
    ];

    let merged = desc().merge_and_sort(Vec::new(), items.clone());
    assert_eq!(source_ids(&merged), vec!["c", "e", "v"]);

    // Priority is not flipped by the sort direction.
    let ascending =
        MergeEngine::new(SortOrder::Asc, SourcePriority::default()).merge_and_sort(Vec::new(), items.clone());
    assert_eq!(source_ids(&ascending), vec!["c", "e", "v"]);

    let videos_first = SourcePriority::new(vec![ContentType::Videos, ContentType::Classifications]);
    let merged = MergeEngine::new(SortOrder::Desc, videos_first).merge_and_sort(Vec::new(), items);
    assert_eq!(source_ids(&merged), vec!["v", "c", "e"]);
}

#[test]
fn test_same_type_ties_use_type_specific_rules() {
    let ts = "2024-05-21T12:00:00Z";
    let engine = desc();

    let classifications = engine.merge_and_sort(
        Vec::new(),
        vec![
            item(ContentType::Classifications, classification("low", ts, "Apis", 0.40)),
            item(ContentType::Classifications, classification("zeta", ts, "Zygaena", 0.95)),
            item(ContentType::Classifications, classification("alpha", ts, "aphid", 0.95)),
        ],
    );
    assert_eq!(source_ids(&classifications), vec!["alpha", "zeta", "low"]);

    let readings = engine.merge_and_sort(
        Vec::new(),
        vec![
            item(ContentType::Environment, environment("cool", ts, 12.0)),
            item(ContentType::Environment, environment("warm", ts, 28.5)),
        ],
    );
    assert_eq!(source_ids(&readings), vec!["warm", "cool"]);

    let videos = engine.merge_and_sort(
        Vec::new(),
        vec![
            item(ContentType::Videos, video("short", ts, 4.0)),
            item(ContentType::Videos, json!({ "id": "unknown", "timestamp": ts })),
            item(ContentType::Videos, video("long", ts, 120.0)),
        ],
    );
    assert_eq!(source_ids(&videos), vec!["long", "short", "unknown"]);
}

#[test]
fn test_missing_timestamp_is_earliest() {
    let items = vec![
        item(ContentType::Environment, json!({ "id": "undated", "temperature": 20.0 })),
        item(ContentType::Environment, environment("dated", "2024-05-21T12:00:00Z", 20.0)),
    ];

    let newest_first = desc().merge_and_sort(Vec::new(), items.clone());
    assert_eq!(source_ids(&newest_first), vec!["dated", "undated"]);

    let oldest_first =
        MergeEngine::new(SortOrder::Asc, SourcePriority::default()).merge_and_sort(Vec::new(), items);
    assert_eq!(source_ids(&oldest_first), vec!["undated", "dated"]);
}

#[test]
fn test_order_is_total() {
    let ts = "2024-05-21T12:00:00Z";
    let mut items = sample();
    // Identical sort keys apart from the id.
    items.push(item(ContentType::Videos, json!({ "id": "twin-a", "timestamp": ts })));
    items.push(item(ContentType::Videos, json!({ "id": "twin-b", "timestamp": ts })));

    let engine = desc();
    for a in &items {
        for b in &items {
            let forward = engine.compare(a, b);
            assert_eq!(forward, engine.compare(b, a).reverse());
            assert_eq!(forward == Ordering::Equal, a.id == b.id);
        }
    }

    // Input order never leaks into the result.
    let mut shuffled = items.clone();
    shuffled.reverse();
    assert_eq!(
        engine.merge_and_sort(Vec::new(), items),
        engine.merge_and_sort(Vec::new(), shuffled)
    );
}
