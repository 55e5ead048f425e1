pub mod parser;
pub mod masking;
pub mod signature;
pub mod dedup;
pub mod knowledge;
pub mod embedding;
pub mod store;
pub mod ingest;
pub mod matcher;
pub mod multiline;
pub mod config;
