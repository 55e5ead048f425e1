use std::fmt::Write;

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::config::{IngestConfig, LookupConfig};
use crate::embedding::{EmbedError, Embedder};
use crate::parser;
use crate::signature;
use crate::store::{SimilarityStore, StoreError, DISPLAY_FIELDS};

/// Shown in place of a match list when the knowledge base has nothing similar.
pub const NO_MATCHES: &str = "No similar error patterns found in knowledge base.";

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    /// Similarity score exactly as reported by the store.
    pub confidence: f64,
    pub severity: String,
    pub signature_log: String,
    pub solution: String,
    pub instrument: String,
}

pub struct MatchEngine<'a, E: Embedder, S: SimilarityStore> {
    embedder: &'a E,
    store: &'a S,
    ingest: &'a IngestConfig,
    lookup: &'a LookupConfig,
}

impl<'a, E: Embedder, S: SimilarityStore> MatchEngine<'a, E, S> {
    pub fn new(embedder: &'a E, store: &'a S, ingest: &'a IngestConfig, lookup: &'a LookupConfig) -> Self {
        Self { embedder, store, ingest, lookup }
    }

    /// Ranked knowledge-base matches for one log line, best first.
    ///
    /// A line that does not parse yields no matches and makes no service call.
    /// With `lookup.filter_severity` set, records outside the ingestion
    /// severities are treated the same way.
    pub fn find_matches(&self, line: &str, top_k: usize) -> Result<Vec<Match>, MatchError> {
        let Some(record) = parser::parse_line(line) else {
            tracing::debug!("line did not parse; no lookup");
            return Ok(Vec::new());
        };
        if self.lookup.filter_severity && !self.ingest.qualifies(&record.severity) {
            tracing::debug!(severity = %record.severity, "severity filtered; no lookup");
            return Ok(Vec::new());
        }

        let signature_text = signature::build_signature_text_with_limit(&record, self.ingest.max_message_chars);
        let vector = self.embedder.embed(&signature_text)?;
        let hits = self.store.query(&vector, top_k, &DISPLAY_FIELDS)?;
        tracing::debug!(msg_id = %record.message_id, hits = hits.len(), "lookup finished");

        Ok(hits
            .into_iter()
            .map(|hit| Match {
                confidence: hit.score,
                severity: hit.severity,
                signature_log: hit.log_content,
                solution: hit.solution,
                instrument: hit.instrument,
            })
            .collect())
    }

    /// [`find_matches`](Self::find_matches) with the configured `top_k`.
    pub fn find_matches_default(&self, line: &str) -> Result<Vec<Match>, MatchError> {
        self.find_matches(line, self.lookup.top_k)
    }
}

/// Plain-text report for one looked-up line, ranked as given.
pub fn format_matches(line: &str, matches: &[Match]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", line.trim());
    let _ = writeln!(out, "{}", "-".repeat(60));
    if matches.is_empty() {
        let _ = writeln!(out, "{NO_MATCHES}\n");
        return out;
    }
    for (rank, m) in matches.iter().enumerate() {
        let _ = writeln!(out, "#{} (Confidence: {:.3})", rank + 1, m.confidence);
        let _ = writeln!(out, "Severity: {}", m.severity);
        let _ = writeln!(out, "Affected Instrument: {}", m.instrument);
        let _ = writeln!(out, "Signature Log: {}", m.signature_log);
        if !m.solution.is_empty() {
            let _ = writeln!(out, "Recommended Solution:\n{}", m.solution.lines().map(|l| format!("  {l}")).join("\n"));
        }
        out.push('\n');
    }
    out
}
