#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use logsig::embedding::{EmbedError, Embedder};
use logsig::knowledge::KnowledgeDocument;
use logsig::store::{ScoredDocument, SimilarityStore, StoreError};

pub const DIMS: usize = 16;

/// Bag-of-words hashing embedder: equal texts give equal vectors and texts
/// sharing words give positive similarity.
pub struct HashEmbedder {
    pub dims: usize,
    pub calls: Cell<usize>,
    pub seen: RefCell<Vec<String>>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_dims(DIMS)
    }

    pub fn with_dims(dims: usize) -> Self {
        Self { dims, calls: Cell::new(0), seen: RefCell::new(Vec::new()) }
    }
}

fn word_bucket(word: &str, dims: usize) -> usize {
    let mut h: u64 = 1469598103934665603;
    for b in word.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    (h % dims as u64) as usize
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(text.to_string());
        let mut v = vec![0.0f32; self.dims];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            v[word_bucket(&word.to_lowercase(), self.dims)] += 1.0;
        }
        Ok(v)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Status { status: 503, body: "unavailable".into() })
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Records upload calls and answers queries with canned hits.
pub struct RecordingStore {
    pub dims: usize,
    pub uploads: RefCell<Vec<Vec<KnowledgeDocument>>>,
    pub hits: Vec<ScoredDocument>,
    pub queries: Cell<usize>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self { dims: DIMS, uploads: RefCell::new(Vec::new()), hits: Vec::new(), queries: Cell::new(0) }
    }

    pub fn with_hits(hits: Vec<ScoredDocument>) -> Self {
        Self { hits, ..Self::new() }
    }

    pub fn uploaded(&self) -> Vec<KnowledgeDocument> {
        self.uploads.borrow().iter().flatten().cloned().collect()
    }
}

impl SimilarityStore for RecordingStore {
    fn upload(&self, documents: &[KnowledgeDocument]) -> Result<usize, StoreError> {
        self.uploads.borrow_mut().push(documents.to_vec());
        Ok(documents.len())
    }

    fn query(&self, _vector: &[f32], top_k: usize, _fields: &[&str]) -> Result<Vec<ScoredDocument>, StoreError> {
        self.queries.set(self.queries.get() + 1);
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

pub fn line(msg_id: &str, channel: &str, log_type: &str, severity: &str, message: &str) -> String {
    format!(
        r#"MsgID="{msg_id}" TimeStamp="2024-06-01 10:30:15" Channel="{channel}" Type="{log_type}" Severity="{severity}" Message="{message}""#
    )
}
