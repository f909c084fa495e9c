use std::collections::HashMap;

use cardex_core::types::CardRecord;
use cardex_lexical::LexicalIndex;

fn record(id: &str, text: &str) -> CardRecord {
    CardRecord {
        id: id.to_string(),
        text: text.to_string(),
        categories: HashMap::new(),
        popularity: None,
        extra: HashMap::new(),
    }
}

fn corpus() -> Vec<CardRecord> {
    vec![
        record("1", "Counter target spell"),
        record("2", "Destroy target creature"),
        record("3", "Counter target creature spell"),
        record("4", "Draw two cards"),
    ]
}

#[test]
fn query_ranks_term_overlap_first() {
    let index = LexicalIndex::build(&corpus()).expect("build");
    let hits = index.query("counter a creature spell", 4).expect("query");

    assert!(!hits.is_empty());
    // Record 3 matches counter, creature and spell; it must lead.
    assert_eq!(hits[0].id, "3");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert!(ids.contains(&"1"));
    // Record 4 shares no query term at all.
    assert!(!ids.contains(&"4"));
}

#[test]
fn identical_corpus_and_query_yield_identical_ordering() {
    let a = LexicalIndex::build(&corpus()).expect("build");
    let b = LexicalIndex::build(&corpus()).expect("build");

    let ha = a.query("counter target creature", 4).expect("query");
    let hb = b.query("counter target creature", 4).expect("query");

    let ids_a: Vec<&str> = ha.iter().map(|h| h.id.as_str()).collect();
    let ids_b: Vec<&str> = hb.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn equal_scores_break_ties_by_insertion_order() {
    // Two records with identical token content score identically; the
    // earlier insertion must win.
    let records = vec![
        record("late", "unique marker phrase"),
        record("early", "unique marker phrase"),
    ];
    // Rebuild with swapped order to show the tie-break follows input order,
    // not the id.
    let index = LexicalIndex::build(&records).expect("build");
    let hits = index.query("unique marker phrase", 2).expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "late", "first-seen record wins the tie");

    let swapped = vec![records[1].clone(), records[0].clone()];
    let index = LexicalIndex::build(&swapped).expect("build");
    let hits = index.query("unique marker phrase", 2).expect("query");
    assert_eq!(hits[0].id, "early");
}

#[test]
fn never_returns_more_than_top_k() {
    let index = LexicalIndex::build(&corpus()).expect("build");
    let hits = index.query("target", 2).expect("query");
    assert!(hits.len() <= 2);
}

#[test]
fn empty_query_yields_no_hits() {
    let index = LexicalIndex::build(&corpus()).expect("build");
    assert!(index.query("", 5).expect("query").is_empty());
    assert!(index.query("   ", 5).expect("query").is_empty());
}

#[test]
fn refresh_replaces_the_corpus() {
    let mut index = LexicalIndex::build(&corpus()).expect("build");
    assert_eq!(index.len(), 4);

    index
        .refresh(&[record("9", "Exile all graveyards")])
        .expect("refresh");
    assert_eq!(index.len(), 1);

    let hits = index.query("counter spell", 5).expect("query");
    assert!(hits.is_empty(), "old corpus must be gone after refresh");
    let hits = index.query("exile graveyards", 5).expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "9");
}

#[test]
fn empty_index_yields_no_hits() {
    let index = LexicalIndex::build(&[]).expect("build");
    assert!(index.is_empty());
    assert!(index.query("anything", 3).expect("query").is_empty());
}
