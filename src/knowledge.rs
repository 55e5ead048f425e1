use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::parser::LogRecord;
use crate::signature::SIGNATURE_VERSION;

pub const ID_SEPARATOR: char = '_';

// Hex digits of the signature hash appended to every id.
const ID_HASH_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One catalogued signature as persisted in the similarity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub raw_text: String,
    pub signature_text: String,
    #[serde(default)]
    pub solution: String,
    pub instrument: String,
    pub severity: String,
    pub embedding: Vec<f32>,
    #[serde(default = "default_signature_version")]
    pub signature_version: u32,
}

fn default_signature_version() -> u32 {
    SIGNATURE_VERSION
}

impl KnowledgeDocument {
    pub fn from_record(
        record: &LogRecord,
        instrument: &str,
        signature_text: String,
        solution: &str,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: document_id(instrument, &record.message_id, &record.timestamp, &signature_text),
            raw_text: record.raw_text.clone(),
            signature_text,
            solution: solution.to_string(),
            instrument: instrument.to_string(),
            severity: record.severity.clone(),
            embedding,
            signature_version: SIGNATURE_VERSION,
        }
    }

    pub fn validate(&self, expected_dims: usize) -> Result<(), DocumentError> {
        if self.embedding.len() != expected_dims {
            return Err(DocumentError::DimensionMismatch {
                expected: expected_dims,
                actual: self.embedding.len(),
            });
        }
        Ok(())
    }
}

/// Deterministic document key.
///
/// `{instrument}_{message_id}_{timestamp}` with every non-alphanumeric
/// character replaced by `_`, followed by a short SHA-256 prefix of the
/// signature text. The hash separates distinct messages that share an
/// instrument, id and (second-granular) timestamp.
pub fn document_id(instrument: &str, message_id: &str, timestamp: &str, signature_text: &str) -> String {
    let mut id = sanitize_key(&format!("{instrument}_{message_id}_{timestamp}"));
    let digest = hex::encode(Sha256::digest(signature_text.as_bytes()));
    id.push(ID_SEPARATOR);
    id.push_str(&digest[..ID_HASH_LEN]);
    id
}

/// Replace every character outside `[A-Za-z0-9]` with [`ID_SEPARATOR`].
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ID_SEPARATOR })
        .collect()
}
