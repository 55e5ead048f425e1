//! Similarity store boundary.
//!
//! [`SimilarityStore`] accepts batches of [`KnowledgeDocument`]s and answers
//! top-K nearest-neighbour queries. Ranking order and score semantics belong
//! to the store; callers keep both as returned.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: brute-force cosine search, optionally persisted to a
//!   JSON file so an offline knowledge base survives between runs.
//! - [`AzureSearchStore`]: an Azure AI Search index with a `content_vector`
//!   vector field.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::knowledge::KnowledgeDocument;

pub const FIELD_LOG_CONTENT: &str = "log_content";
pub const FIELD_SOLUTION: &str = "solution";
pub const FIELD_INSTRUMENT: &str = "instrument";
pub const FIELD_SEVERITY: &str = "severity";
pub const FIELD_VECTOR: &str = "content_vector";

/// Fields a lookup needs for display.
pub const DISPLAY_FIELDS: [&str; 4] = [FIELD_LOG_CONTENT, FIELD_SOLUTION, FIELD_INSTRUMENT, FIELD_SEVERITY];

const AZURE_API_VERSION: &str = "2023-11-01";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("store data error: {0}")]
    Data(#[from] serde_json::Error),
    #[error("store misconfigured: {0}")]
    Config(String),
}

/// A store hit restricted to the display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub score: f64,
    #[serde(default)]
    pub log_content: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub instrument: String,
    #[serde(default)]
    pub severity: String,
}

pub trait SimilarityStore {
    /// Upsert by id; returns how many documents the store accepted.
    fn upload(&self, documents: &[KnowledgeDocument]) -> Result<usize, StoreError>;

    /// Nearest documents to `vector`, best first.
    fn query(&self, vector: &[f32], top_k: usize, fields: &[&str]) -> Result<Vec<ScoredDocument>, StoreError>;

    /// Vector length the index was provisioned with.
    fn dims(&self) -> usize;
}

impl<S: SimilarityStore + ?Sized> SimilarityStore for &S {
    fn upload(&self, documents: &[KnowledgeDocument]) -> Result<usize, StoreError> {
        (**self).upload(documents)
    }
    fn query(&self, vector: &[f32], top_k: usize, fields: &[&str]) -> Result<Vec<ScoredDocument>, StoreError> {
        (**self).query(vector, top_k, fields)
    }
    fn dims(&self) -> usize {
        (**self).dims()
    }
}

impl<S: SimilarityStore + ?Sized> SimilarityStore for Box<S> {
    fn upload(&self, documents: &[KnowledgeDocument]) -> Result<usize, StoreError> {
        (**self).upload(documents)
    }
    fn query(&self, vector: &[f32], top_k: usize, fields: &[&str]) -> Result<Vec<ScoredDocument>, StoreError> {
        (**self).query(vector, top_k, fields)
    }
    fn dims(&self) -> usize {
        (**self).dims()
    }
}

fn project(doc: &KnowledgeDocument, score: f64, fields: &[&str]) -> ScoredDocument {
    let pick = |name: &str, value: &str| if fields.contains(&name) { value.to_string() } else { String::new() };
    ScoredDocument {
        score,
        log_content: pick(FIELD_LOG_CONTENT, &doc.raw_text),
        solution: pick(FIELD_SOLUTION, &doc.solution),
        instrument: pick(FIELD_INSTRUMENT, &doc.instrument),
        severity: pick(FIELD_SEVERITY, &doc.severity),
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

// ============ In-memory store ============

pub struct MemoryStore {
    dims: usize,
    docs: RwLock<HashMap<String, KnowledgeDocument>>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(dims: usize) -> Self {
        Self { dims, docs: RwLock::new(HashMap::new()), path: None }
    }

    /// Load documents from `path` if it exists; every upload rewrites the file.
    pub fn open(path: impl AsRef<Path>, dims: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut docs = HashMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io { path: path.clone(), source })?;
            let stored: Vec<KnowledgeDocument> = serde_json::from_str(&raw)?;
            for doc in stored {
                docs.insert(doc.id.clone(), doc);
            }
        }
        tracing::debug!(path = %path.display(), documents = docs.len(), "opened memory store");
        Ok(Self { dims, docs: RwLock::new(docs), path: Some(path) })
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<KnowledgeDocument> {
        self.docs.read().ok().and_then(|d| d.get(id).cloned())
    }

    fn persist(&self, docs: &HashMap<String, KnowledgeDocument>) -> Result<(), StoreError> {
        let Some(path) = &self.path else { return Ok(()) };
        let mut all: Vec<&KnowledgeDocument> = docs.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_string_pretty(&all)?;
        fs::write(path, json).map_err(|source| StoreError::Io { path: path.clone(), source })
    }
}

fn poisoned() -> StoreError {
    StoreError::Config("memory store lock poisoned".into())
}

impl SimilarityStore for MemoryStore {
    fn upload(&self, documents: &[KnowledgeDocument]) -> Result<usize, StoreError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        let mut next = docs.clone();
        let mut accepted = 0;
        for doc in documents {
            if doc.embedding.len() != self.dims {
                tracing::warn!(id = %doc.id, dims = doc.embedding.len(), expected = self.dims, "memory store rejected document");
                continue;
            }
            next.insert(doc.id.clone(), doc.clone());
            accepted += 1;
        }
        // Only serve what made it to disk.
        self.persist(&next)?;
        *docs = next;
        Ok(accepted)
    }

    fn query(&self, vector: &[f32], top_k: usize, fields: &[&str]) -> Result<Vec<ScoredDocument>, StoreError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let mut scored: Vec<(f32, &KnowledgeDocument)> = docs
            .values()
            .map(|d| (cosine_similarity(vector, &d.embedding), d))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, doc)| project(doc, score as f64, fields))
            .collect())
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

// ============ Azure AI Search ============

pub struct AzureSearchStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    index: String,
    api_key: String,
    dims: usize,
}

impl AzureSearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| StoreError::Config("store.endpoint is not set".into()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| StoreError::Config("search api key is not set".into()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            api_key,
            dims: config.dims,
        })
    }

    fn docs_url(&self, action: &str) -> String {
        format!("{}/indexes/{}/docs/{action}?api-version={AZURE_API_VERSION}", self.endpoint, self.index)
    }

    fn post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value, StoreError> {
        let resp = self.client.post(url).header("api-key", &self.api_key).json(body).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(StoreError::Status { status: status.as_u16(), body });
        }
        Ok(resp.json()?)
    }
}

fn azure_upload_body(documents: &[KnowledgeDocument]) -> serde_json::Value {
    let value: Vec<serde_json::Value> = documents
        .iter()
        .map(|d| {
            serde_json::json!({
                "@search.action": "mergeOrUpload",
                "id": d.id,
                FIELD_LOG_CONTENT: d.raw_text,
                "signature_text": d.signature_text,
                FIELD_SOLUTION: d.solution,
                FIELD_INSTRUMENT: d.instrument,
                FIELD_SEVERITY: d.severity,
                FIELD_VECTOR: d.embedding,
            })
        })
        .collect();
    serde_json::json!({ "value": value })
}

fn azure_query_body(vector: &[f32], top_k: usize, fields: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "vectorQueries": [{
            "kind": "vector",
            "vector": vector,
            "k": top_k,
            "fields": FIELD_VECTOR,
        }],
        "select": fields.join(","),
        "top": top_k,
    })
}

fn count_accepted(resp: &serde_json::Value) -> usize {
    resp.get("value")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|i| i.get("status").and_then(|s| s.as_bool()).unwrap_or(false))
                .count()
        })
        .unwrap_or(0)
}

fn parse_hits(resp: &serde_json::Value) -> Vec<ScoredDocument> {
    let text = |hit: &serde_json::Value, key: &str| hit.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    resp.get("value")
        .and_then(|v| v.as_array())
        .map(|hits| {
            hits.iter()
                .map(|hit| ScoredDocument {
                    score: hit.get("@search.score").and_then(|s| s.as_f64()).unwrap_or(0.0),
                    log_content: text(hit, FIELD_LOG_CONTENT),
                    solution: text(hit, FIELD_SOLUTION),
                    instrument: text(hit, FIELD_INSTRUMENT),
                    severity: text(hit, FIELD_SEVERITY),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl SimilarityStore for AzureSearchStore {
    fn upload(&self, documents: &[KnowledgeDocument]) -> Result<usize, StoreError> {
        let resp = self.post(&self.docs_url("index"), &azure_upload_body(documents))?;
        let accepted = count_accepted(&resp);
        tracing::debug!(index = %self.index, sent = documents.len(), accepted, "uploaded documents");
        Ok(accepted)
    }

    fn query(&self, vector: &[f32], top_k: usize, fields: &[&str]) -> Result<Vec<ScoredDocument>, StoreError> {
        let resp = self.post(&self.docs_url("search"), &azure_query_body(vector, top_k, fields))?;
        Ok(parse_hits(&resp))
    }

    fn dims(&self) -> usize {
        self.dims
    }
}
