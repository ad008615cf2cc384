//! Indexing error taxonomy.
//!
//! Per-file errors ([`IndexError::TransientFile`], [`IndexError::UnsupportedContent`],
//! [`IndexError::Embedding`]) are counted, logged, and skipped; one bad file never
//! aborts a batch. Repository-level errors ([`IndexError::Configuration`]) always
//! abort. [`IndexError::CorruptIndex`] is recoverable: the search index is rebuilt
//! from the per-file vector store plus the change tracker.

use std::path::PathBuf;

#[derive(Debug)]
pub enum IndexError {
    /// File could not be read (missing, locked, permission denied).
    TransientFile { path: PathBuf, reason: String },
    /// Extension is recognized but the content could not be parsed.
    UnsupportedContent { path: PathBuf, reason: String },
    /// The embedding provider failed for this file.
    Embedding { path: PathBuf, reason: String },
    /// Repository misconfiguration, e.g. embedding-dimension mismatch
    /// between the repository declaration and the configured provider.
    Configuration(String),
    /// The on-disk search index is unreadable or inconsistent.
    CorruptIndex(String),
}

impl IndexError {
    /// Whether this error aborts the whole operation rather than one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Configuration(_))
    }

    pub fn transient(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        IndexError::TransientFile {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn unsupported(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        IndexError::UnsupportedContent {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn embedding(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        IndexError::Embedding {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::TransientFile { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            IndexError::UnsupportedContent { path, reason } => {
                write!(f, "cannot extract {}: {}", path.display(), reason)
            }
            IndexError::Embedding { path, reason } => {
                write!(f, "embedding failed for {}: {}", path.display(), reason)
            }
            IndexError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            IndexError::CorruptIndex(msg) => write!(f, "corrupt search index: {}", msg),
        }
    }
}

impl std::error::Error for IndexError {}
