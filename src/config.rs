//! TOML configuration with environment overrides.
//!
//! Every field has a default, so an empty file (or no file) is valid. Secrets
//! are never read from the file: API keys come from the environment only
//! (a `.env` file in the working directory is honoured by the binary).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::masking::DEFAULT_MAX_MESSAGE_CHARS;

pub const ENV_EMBEDDING_ENDPOINT: &str = "EMBEDDING_ENDPOINT";
pub const ENV_EMBEDDING_API_KEY: &str = "EMBEDDING_API_KEY";
pub const ENV_SEARCH_ENDPOINT: &str = "AZURE_SEARCH_ENDPOINT";
pub const ENV_SEARCH_KEY: &str = "AZURE_SEARCH_KEY";
pub const ENV_SEARCH_INDEX: &str = "SEARCH_INDEX_NAME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid config {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub lookup: LookupConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    #[default]
    Bearer,
    ApiKey,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: Option<String>,
    pub model: String,
    pub dims: usize,
    pub timeout_secs: u64,
    pub auth: AuthScheme,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "text-embedding-3-small".to_string(),
            dims: 1536,
            timeout_secs: 30,
            auth: AuthScheme::Bearer,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    Memory,
    AzureSearch,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// JSON file backing the memory store; in-process only when unset.
    pub path: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub index: String,
    pub dims: usize,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            path: None,
            endpoint: None,
            index: "log-file-errors".to_string(),
            dims: 1536,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// Compared verbatim (case-sensitive) with the record severity.
    pub severities: Vec<String>,
    pub max_message_chars: usize,
    /// Persist admitted signatures here so repeats are skipped across runs.
    pub registry_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            severities: vec!["Error".to_string(), "Warning".to_string()],
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            registry_path: None,
        }
    }
}

impl IngestConfig {
    pub fn qualifies(&self, severity: &str) -> bool {
        self.severities.iter().any(|s| s == severity)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LookupConfig {
    pub top_k: usize,
    /// Restrict lookups to the ingestion severities.
    pub filter_severity: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self { top_k: 3, filter_severity: false }
    }
}

impl Config {
    /// Load `path` if given (a missing explicit path is an error), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_EMBEDDING_ENDPOINT) {
            self.embedding.endpoint = Some(v);
        }
        if let Some(v) = lookup(ENV_EMBEDDING_API_KEY) {
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = lookup(ENV_SEARCH_ENDPOINT) {
            self.store.endpoint = Some(v);
        }
        if let Some(v) = lookup(ENV_SEARCH_KEY) {
            self.store.api_key = Some(v);
        }
        if let Some(v) = lookup(ENV_SEARCH_INDEX) {
            self.store.index = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dims != self.store.dims {
            return Err(ConfigError::Invalid(format!(
                "embedding.dims ({}) must equal store.dims ({})",
                self.embedding.dims, self.store.dims
            )));
        }
        if self.lookup.top_k == 0 {
            return Err(ConfigError::Invalid("lookup.top_k must be at least 1".into()));
        }
        if self.ingest.severities.is_empty() {
            return Err(ConfigError::Invalid("ingest.severities must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.store.kind, StoreKind::Memory);
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.ingest.severities, vec!["Error", "Warning"]);
        assert_eq!(cfg.ingest.max_message_chars, 200);
        assert!(!cfg.lookup.filter_severity);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [embedding]
            endpoint = "https://example.openai.azure.com/models"
            dims = 8
            auth = "api-key"

            [store]
            kind = "azure-search"
            index = "instrument-errors"
            dims = 8

            [lookup]
            top_k = 1
            filter_severity = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.embedding.auth, AuthScheme::ApiKey);
        assert_eq!(cfg.store.kind, StoreKind::AzureSearch);
        assert_eq!(cfg.store.index, "instrument-errors");
        assert_eq!(cfg.lookup.top_k, 1);
        assert!(cfg.lookup.filter_severity);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_endpoints_and_secrets() {
        let env: HashMap<&str, &str> = [
            (ENV_EMBEDDING_API_KEY, "k1"),
            (ENV_SEARCH_KEY, "k2"),
            (ENV_SEARCH_INDEX, "other-index"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.embedding.api_key.as_deref(), Some("k1"));
        assert_eq!(cfg.store.api_key.as_deref(), Some("k2"));
        assert_eq!(cfg.store.index, "other-index");
        assert!(cfg.embedding.endpoint.is_none());
    }

    #[test]
    fn api_keys_are_not_read_from_file() {
        let cfg = Config::from_toml_str("[store]\napi_key = \"leaked\"\n").unwrap();
        assert!(cfg.store.api_key.is_none());
    }

    #[test]
    fn mismatched_dims_are_rejected() {
        let mut cfg = Config::default();
        cfg.store.dims = 3;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn severity_filter_is_case_sensitive() {
        let cfg = IngestConfig::default();
        assert!(cfg.qualifies("Error"));
        assert!(cfg.qualifies("Warning"));
        assert!(!cfg.qualifies("error"));
        assert!(!cfg.qualifies("Information"));
    }
}
