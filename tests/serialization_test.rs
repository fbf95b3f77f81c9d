use slimsearch::{
    Combinator, Document, IndexOptions, SearchIndex, SearchOptions, SlimSearchError,
};

fn doc(id: i64, title: &str, text: &str) -> Document {
    Document::new()
        .with_field("id", id)
        .with_text("title", title)
        .with_text("text", text)
}

fn options() -> IndexOptions {
    IndexOptions::builder()
        .fields(["title", "text"])
        .store_fields(["title"])
        .build()
        .unwrap()
}

fn corpus_index() -> SearchIndex {
    let index = SearchIndex::new(options()).unwrap();
    index
        .add_all(&[
            doc(1, "Moby Dick", "Call me Ishmael"),
            doc(2, "Zen and the Art of Motorcycle", "I can see"),
            doc(3, "Neuromancer", "The sky above the port"),
            doc(4, "Zen and the Art of Archery", "At first sight"),
        ])
        .unwrap();
    index
}

fn assert_same_results(a: &SearchIndex, b: &SearchIndex, query: &str, options: &SearchOptions) {
    let left = a.search_with(query, options).unwrap();
    let right = b.search_with(query, options).unwrap();
    assert_eq!(left.len(), right.len(), "result count for '{query}'");
    for (l, r) in left.iter().zip(right.iter()) {
        assert_eq!(l.id, r.id, "ids for '{query}'");
        assert!(
            (l.score - r.score).abs() < 1e-12,
            "scores for '{query}': {} vs {}",
            l.score,
            r.score
        );
        assert_eq!(l.terms, r.terms);
        assert_eq!(l.match_info, r.match_info);
    }
}

#[test]
fn test_round_trip_preserves_search_results() {
    let index = corpus_index();
    let json = index.to_json().unwrap();
    let loaded = SearchIndex::load_json(&json, options()).unwrap();

    assert_eq!(loaded.document_count(), index.document_count());
    assert_eq!(loaded.term_count(), index.term_count());
    assert_eq!(loaded.dirt_count(), index.dirt_count());

    let cases: Vec<(&str, SearchOptions)> = vec![
        ("zen art motorcycle", SearchOptions::new()),
        ("moto", SearchOptions::new().prefix(true)),
        ("ismael", SearchOptions::new().fuzzy(0.2)),
        ("zen archery", SearchOptions::new().combine_with(Combinator::And)),
        ("the sky", SearchOptions::new().boost("title", 2.0)),
    ];
    for (query, options) in &cases {
        assert_same_results(&index, &loaded, query, options);
    }
}

#[test]
fn test_round_trip_preserves_stored_fields() {
    let index = corpus_index();
    let json = index.to_json().unwrap();
    let loaded = SearchIndex::load_json(&json, options()).unwrap();
    let stored = loaded.get_stored_fields(3).unwrap();
    assert_eq!(stored.get("title").unwrap().as_text(), Some("Neuromancer"));
}

#[test]
fn test_round_trip_preserves_dirt_and_short_ids() {
    let index = corpus_index();
    index.discard(2).unwrap();
    let json = index.to_json().unwrap();
    let loaded = SearchIndex::load_json(&json, options()).unwrap();

    assert_eq!(loaded.dirt_count(), 1);
    assert_eq!(loaded.document_count(), 3);
    assert!(!loaded.has(2));
    assert!(loaded.search("motorcycle").unwrap().is_empty());

    // New documents get fresh short-ids; the old external id is free again.
    loaded.add(&doc(2, "Zen Again", "anew")).unwrap();
    assert_eq!(loaded.search("anew").unwrap().len(), 1);
}

#[tokio::test]
async fn test_round_trip_after_vacuum() {
    let index = corpus_index();
    index.discard(2).unwrap();
    index.vacuum().await;
    let json = index.to_json().unwrap();
    let loaded = SearchIndex::load_json(&json, options()).unwrap();
    assert_eq!(loaded.dirt_count(), 0);
    assert_same_results(&index, &loaded, "zen", &SearchOptions::new());
}

#[test]
fn test_mutations_after_load() {
    let index = corpus_index();
    let json = index.to_json().unwrap();
    let loaded = SearchIndex::load_json(&json, options()).unwrap();

    loaded.add(&doc(5, "Snow Crash", "The Deliverator")).unwrap();
    assert_eq!(loaded.search("deliverator").unwrap().len(), 1);

    loaded
        .remove(&doc(1, "Moby Dick", "Call me Ishmael"))
        .unwrap();
    assert!(loaded.search("ishmael").unwrap().is_empty());
    assert_eq!(loaded.document_count(), 4);
}

#[test]
fn test_incompatible_version_rejected() {
    let err = SearchIndex::load_json(r#"{"version": 5, "index": []}"#, options()).unwrap_err();
    assert!(matches!(
        err,
        SlimSearchError::IncompatibleVersion { version: 5 }
    ));
}

#[test]
fn test_malformed_json_rejected() {
    let err = SearchIndex::load_json("not json at all", options()).unwrap_err();
    assert!(matches!(err, SlimSearchError::Serialization(_)));
}

#[test]
fn test_version_1_compatibility_path() {
    let json = r#"{
        "documentCount": 2,
        "nextId": 2,
        "documentIds": {"0": 1, "1": "doc-b"},
        "fieldIds": {"title": 0, "text": 1},
        "fieldLength": {"0": [2, 3], "1": [1, 0]},
        "averageFieldLength": [1.5, 1.5],
        "storedFields": {"0": {"title": "Moby Dick"}},
        "version": 1,
        "index": [
            ["dick", {"0": {"df": 1, "ds": {"0": 1}}}],
            ["ishmael", {"1": {"df": 1, "ds": {"0": 1}}}],
            ["zen", {"0": {"df": 1, "ds": {"1": 1}}}]
        ]
    }"#;
    let loaded = SearchIndex::load_json(json, options()).unwrap();

    // Dirt counters are unknown in version 1 and reset to zero.
    assert_eq!(loaded.dirt_count(), 0);
    assert_eq!(loaded.document_count(), 2);
    assert_eq!(loaded.search("ishmael").unwrap().len(), 1);
    assert_eq!(loaded.search("zen").unwrap().len(), 1);
    assert!(loaded.has(1));
    assert!(loaded.has("doc-b"));
    assert_eq!(
        loaded
            .get_stored_fields(1)
            .unwrap()
            .get("title")
            .unwrap()
            .as_text(),
        Some("Moby Dick")
    );
}

#[tokio::test]
async fn test_load_json_async_matches_sync() {
    let index = corpus_index();
    let json = index.to_json().unwrap();
    let loaded = SearchIndex::load_json_async(&json, options()).await.unwrap();
    assert_eq!(loaded.document_count(), 4);
    assert_same_results(&index, &loaded, "zen art motorcycle", &SearchOptions::new());
}

#[tokio::test]
async fn test_add_all_async() {
    let index = SearchIndex::new(options()).unwrap();
    let documents: Vec<Document> = (0..55)
        .map(|i| doc(i, &format!("title {i}"), "shared body"))
        .collect();
    index.add_all_async(&documents).await.unwrap();
    assert_eq!(index.document_count(), 55);
    assert_eq!(index.search("shared").unwrap().len(), 55);
}

#[test]
fn test_dump_is_stable() {
    let index = corpus_index();
    let first = index.to_json().unwrap();
    let second = index.to_json().unwrap();
    assert_eq!(first, second);
}
