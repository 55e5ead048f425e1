use logsig::knowledge::KnowledgeDocument;
use logsig::store::{MemoryStore, SimilarityStore, DISPLAY_FIELDS, FIELD_LOG_CONTENT};

fn doc(id: &str, embedding: Vec<f32>) -> KnowledgeDocument {
    KnowledgeDocument {
        id: id.to_string(),
        raw_text: format!("raw {id}"),
        signature_text: format!("C, T, Error, {id}"),
        solution: String::new(),
        instrument: "inst".to_string(),
        severity: "Error".to_string(),
        embedding,
        signature_version: 1,
    }
}

#[test]
fn ranks_by_cosine_similarity() {
    let store = MemoryStore::new(3);
    store
        .upload(&[doc("a", vec![1.0, 0.0, 0.0]), doc("b", vec![0.0, 1.0, 0.0]), doc("c", vec![1.0, 1.0, 0.0])])
        .unwrap();

    let hits = store.query(&[1.0, 0.1, 0.0], 2, &DISPLAY_FIELDS).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].log_content, "raw a");
    assert_eq!(hits[1].log_content, "raw c");
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn unrequested_fields_are_left_empty() {
    let store = MemoryStore::new(2);
    store.upload(&[doc("a", vec![1.0, 0.0])]).unwrap();
    let hits = store.query(&[1.0, 0.0], 1, &[FIELD_LOG_CONTENT]).unwrap();
    assert_eq!(hits[0].log_content, "raw a");
    assert!(hits[0].instrument.is_empty());
    assert!(hits[0].severity.is_empty());
}

#[test]
fn wrong_dimension_documents_are_rejected() {
    let store = MemoryStore::new(3);
    let accepted = store.upload(&[doc("a", vec![1.0, 0.0, 0.0]), doc("b", vec![1.0, 0.0])]).unwrap();
    assert_eq!(accepted, 1);
    assert_eq!(store.len(), 1);
    assert!(store.get("b").is_none());
}

#[test]
fn upload_upserts_by_id() {
    let store = MemoryStore::new(2);
    store.upload(&[doc("a", vec![1.0, 0.0])]).unwrap();
    let mut updated = doc("a", vec![0.0, 1.0]);
    updated.solution = "Replace the lamp.".to_string();
    store.upload(&[updated]).unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.get("a").unwrap().solution, "Replace the lamp.");
}

#[test]
fn persisted_store_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.json");
    {
        let store = MemoryStore::open(&path, 2).unwrap();
        assert!(store.is_empty());
        store.upload(&[doc("b", vec![0.0, 1.0]), doc("a", vec![1.0, 0.0])]).unwrap();
    }
    assert!(path.exists());

    let store = MemoryStore::open(&path, 2).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("a").unwrap().embedding, vec![1.0, 0.0]);
    let hits = store.query(&[0.0, 1.0], 1, &DISPLAY_FIELDS).unwrap();
    assert_eq!(hits[0].log_content, "raw b");
}

#[test]
fn empty_store_has_no_hits() {
    let store = MemoryStore::new(2);
    assert!(store.query(&[1.0, 0.0], 3, &DISPLAY_FIELDS).unwrap().is_empty());
}

#[test]
fn failed_persist_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("kb.json");
    let store = MemoryStore::open(&path, 2).unwrap();

    assert!(store.upload(&[doc("a", vec![1.0, 0.0])]).is_err());
    assert!(store.is_empty());
    assert!(store.query(&[1.0, 0.0], 3, &DISPLAY_FIELDS).unwrap().is_empty());
}
