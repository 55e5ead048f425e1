//! Signature admission registries.
//!
//! A registry remembers which signatures were already admitted to the
//! knowledge base so repeats are rejected before any embedding call is made.
//! [`MemoryRegistry`] lives for one process run; [`FileRegistry`] appends each
//! admitted signature to a file and reloads it on open, so repeats are also
//! rejected across runs.

use ahash::AHashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub trait SignatureRegistry {
    /// Insert `signature` and return `true` if it was not yet admitted;
    /// return `false` and leave the registry untouched otherwise.
    fn admit(&mut self, signature: &str) -> Result<bool, RegistryError>;

    fn contains(&self, signature: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    seen: AHashSet<String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignatureRegistry for MemoryRegistry {
    fn admit(&mut self, signature: &str) -> Result<bool, RegistryError> {
        if self.seen.contains(signature) {
            return Ok(false);
        }
        self.seen.insert(signature.to_string());
        Ok(true)
    }

    fn contains(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

/// Durable registry: one signature per line, append-only. Line breaks and
/// backslashes inside a signature are stored escaped.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    seen: AHashSet<String>,
    file: File,
}

impl FileRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| RegistryError::Io { path: path.clone(), source };

        let mut seen = AHashSet::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path).map_err(io_err)?);
            for line in reader.lines() {
                let line = line.map_err(io_err)?;
                if !line.is_empty() {
                    seen.insert(unescape_line(&line));
                }
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).map_err(io_err)?;
        tracing::debug!(path = %path.display(), signatures = seen.len(), "opened signature registry");
        Ok(Self { path, seen, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SignatureRegistry for FileRegistry {
    fn admit(&mut self, signature: &str) -> Result<bool, RegistryError> {
        if self.seen.contains(signature) {
            return Ok(false);
        }
        writeln!(self.file, "{}", escape_line(signature))
            .and_then(|_| self.file.flush())
            .map_err(|source| RegistryError::Io { path: self.path.clone(), source })?;
        self.seen.insert(signature.to_string());
        Ok(true)
    }

    fn contains(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

fn escape_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_is_reversible() {
        for s in ["plain", "two\nlines", "back\\slash\\n", "cr\r\nlf", "trailing\\"] {
            let escaped = escape_line(s);
            assert!(!escaped.contains('\n'));
            assert_eq!(unescape_line(&escaped), s);
        }
    }
}
