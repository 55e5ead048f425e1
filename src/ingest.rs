use ahash::AHashSet;
use serde::Serialize;
use thiserror::Error;

use crate::config::IngestConfig;
use crate::dedup::{RegistryError, SignatureRegistry};
use crate::embedding::{EmbedError, Embedder};
use crate::knowledge::KnowledgeDocument;
use crate::parser::LogRecord;
use crate::signature;
use crate::store::{SimilarityStore, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records: usize,
    /// Severity outside the qualifying set.
    pub filtered: usize,
    /// Signature already admitted, or repeated within the batch.
    pub duplicates: usize,
    pub dimension_mismatches: usize,
    /// Documents handed to the store.
    pub submitted: usize,
    /// Documents the store accepted.
    pub uploaded: usize,
}

pub struct KnowledgeBaseWriter<'a, E: Embedder, S: SimilarityStore> {
    embedder: &'a E,
    store: &'a S,
    config: &'a IngestConfig,
    solution: String,
}

impl<'a, E: Embedder, S: SimilarityStore> KnowledgeBaseWriter<'a, E, S> {
    pub fn new(embedder: &'a E, store: &'a S, config: &'a IngestConfig) -> Self {
        Self { embedder, store, config, solution: String::new() }
    }

    /// Solution text attached to every document of subsequent batches.
    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = solution.into();
        self
    }

    /// Embed and upload every qualifying, not yet admitted record.
    ///
    /// Records are processed in order; one embedding call per new signature,
    /// one store call for the whole batch. A vector of the wrong length is
    /// logged and skipped. Signatures are admitted to the registry only after
    /// the store accepted the batch, so a failed or skipped record is retried
    /// by the next run.
    pub fn ingest<R: SignatureRegistry + ?Sized>(
        &self,
        records: &[LogRecord],
        instrument: &str,
        registry: &mut R,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport { records: records.len(), ..Default::default() };
        let expected_dims = self.store.dims();
        if self.embedder.dims() != expected_dims {
            tracing::warn!(
                model = self.embedder.model_name(),
                embedder_dims = self.embedder.dims(),
                store_dims = expected_dims,
                "embedder and store dimensions differ"
            );
        }
        let mut pending: AHashSet<String> = AHashSet::new();
        let mut batch = Vec::new();

        for record in records {
            if !self.config.qualifies(&record.severity) {
                report.filtered += 1;
                continue;
            }
            let signature_text = signature::build_signature_text_with_limit(record, self.config.max_message_chars);
            if registry.contains(&signature_text) || !pending.insert(signature_text.clone()) {
                tracing::debug!(msg_id = %record.message_id, "duplicate signature skipped");
                report.duplicates += 1;
                continue;
            }

            let embedding = self.embedder.embed(&signature_text)?;
            let doc = KnowledgeDocument::from_record(record, instrument, signature_text, &self.solution, embedding);
            if let Err(e) = doc.validate(expected_dims) {
                tracing::warn!(id = %doc.id, error = %e, "document rejected before upload");
                report.dimension_mismatches += 1;
                continue;
            }
            batch.push(doc);
        }

        if !batch.is_empty() {
            report.submitted = batch.len();
            report.uploaded = self.store.upload(&batch)?;
            for doc in &batch {
                registry.admit(&doc.signature_text)?;
            }
        }
        tracing::info!(
            instrument,
            records = report.records,
            filtered = report.filtered,
            duplicates = report.duplicates,
            uploaded = report.uploaded,
            "ingestion finished"
        );
        Ok(report)
    }
}
