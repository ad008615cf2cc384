//! Durable per-file embedding storage.
//!
//! Each indexed file owns two artifacts, keyed by the SHA-256 of its path so
//! arbitrary paths map to flat filenames:
//!
//! - `embeddings/<key>.vec`: all chunk vectors concatenated as little-endian
//!   f32, row-major.
//! - `metadata/<key>.json`: path, model identity, dimension, and the chunk
//!   texts in order.
//!
//! Writes go through a temp file and rename so a crash never leaves a
//! half-written artifact. This store is the durable source of truth the
//! search index can be rebuilt from.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::warn;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::repo::Repository;

/// The embeddings and chunk texts for one file.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub path: String,
    pub model: String,
    pub dims: usize,
    pub chunks: Vec<String>,
    /// One vector per chunk, each of length `dims`.
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    path: String,
    model: String,
    dims: usize,
    chunk_count: usize,
    chunks: Vec<String>,
}

pub struct VectorStore {
    embeddings_dir: PathBuf,
    metadata_dir: PathBuf,
}

impl VectorStore {
    pub fn new(repo: &Repository) -> Self {
        Self {
            embeddings_dir: repo.embeddings_dir(),
            metadata_dir: repo.metadata_dir(),
        }
    }

    /// Flat storage key for a file path.
    pub fn storage_key(path: &str) -> String {
        format!("{:x}", Sha256::digest(path.as_bytes()))
    }

    fn vector_path(&self, key: &str) -> PathBuf {
        self.embeddings_dir.join(format!("{}.vec", key))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.metadata_dir.join(format!("{}.json", key))
    }

    /// Persist a record, replacing any previous artifacts for the same path.
    pub fn save(&self, record: &VectorRecord) -> Result<()> {
        let key = Self::storage_key(&record.path);

        let mut blob = Vec::with_capacity(record.vectors.len() * record.dims * 4);
        for vector in &record.vectors {
            anyhow::ensure!(
                vector.len() == record.dims,
                "vector for {} has dimension {} but record declares {}",
                record.path,
                vector.len(),
                record.dims
            );
            blob.extend_from_slice(&vec_to_blob(vector));
        }

        let sidecar = Sidecar {
            path: record.path.clone(),
            model: record.model.clone(),
            dims: record.dims,
            chunk_count: record.chunks.len(),
            chunks: record.chunks.clone(),
        };

        write_atomic(&self.vector_path(&key), &blob)?;
        write_atomic(
            &self.sidecar_path(&key),
            serde_json::to_vec_pretty(&sidecar)?.as_slice(),
        )?;
        Ok(())
    }

    /// Load the record for a path. `None` when nothing is stored, an error
    /// when the stored artifacts are inconsistent.
    pub fn load(&self, path: &str) -> Result<Option<VectorRecord>> {
        let key = Self::storage_key(path);
        let sidecar_path = self.sidecar_path(&key);
        if !sidecar_path.exists() {
            return Ok(None);
        }

        let sidecar: Sidecar = serde_json::from_slice(
            &std::fs::read(&sidecar_path)
                .with_context(|| format!("reading {}", sidecar_path.display()))?,
        )
        .with_context(|| format!("parsing {}", sidecar_path.display()))?;

        let blob = std::fs::read(self.vector_path(&key))
            .with_context(|| format!("reading vectors for {}", path))?;

        let expected = sidecar.chunk_count * sidecar.dims * 4;
        anyhow::ensure!(
            blob.len() == expected,
            "vector blob for {} has {} bytes, expected {}",
            path,
            blob.len(),
            expected
        );

        let flat = blob_to_vec(&blob);
        let vectors = if sidecar.dims == 0 {
            Vec::new()
        } else {
            flat.chunks(sidecar.dims).map(|c| c.to_vec()).collect()
        };

        Ok(Some(VectorRecord {
            path: sidecar.path,
            model: sidecar.model,
            dims: sidecar.dims,
            chunks: sidecar.chunks,
            vectors,
        }))
    }

    /// Remove the artifacts for a path. Missing files are not an error.
    pub fn delete(&self, path: &str) -> Result<()> {
        let key = Self::storage_key(path);
        for target in [self.vector_path(&key), self.sidecar_path(&key)] {
            if let Err(e) = std::fs::remove_file(&target) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %target.display(), error = %e, "failed to remove artifact");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Total bytes of stored vector blobs.
    pub fn storage_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        if self.embeddings_dir.exists() {
            for entry in std::fs::read_dir(&self.embeddings_dir)? {
                total += entry?.metadata()?.len();
            }
        }
        Ok(total)
    }
}

fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> VectorStore {
        let repo = Repository::init(tmp.path()).unwrap();
        VectorStore::new(&repo)
    }

    fn sample_record(path: &str) -> VectorRecord {
        VectorRecord {
            path: path.to_string(),
            model: "test-model".to_string(),
            dims: 3,
            chunks: vec!["first chunk".to_string(), "second chunk".to_string()],
            vectors: vec![vec![1.0, 0.0, 0.5], vec![-0.25, 2.0, 0.125]],
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let record = sample_record("docs/notes.txt");
        store.save(&record).unwrap();

        let loaded = store.load("docs/notes.txt").unwrap().unwrap();
        assert_eq!(loaded.path, record.path);
        assert_eq!(loaded.model, "test-model");
        assert_eq!(loaded.dims, 3);
        assert_eq!(loaded.chunks, record.chunks);
        assert_eq!(loaded.vectors, record.vectors);
    }

    #[test]
    fn load_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(store.load("never/indexed.txt").unwrap().is_none());
    }

    #[test]
    fn save_replaces_previous_artifacts() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        store.save(&sample_record("a.txt")).unwrap();
        let mut updated = sample_record("a.txt");
        updated.chunks = vec!["only one now".to_string()];
        updated.vectors = vec![vec![9.0, 9.0, 9.0]];
        store.save(&updated).unwrap();

        let loaded = store.load("a.txt").unwrap().unwrap();
        assert_eq!(loaded.chunks.len(), 1);
        assert_eq!(loaded.vectors, vec![vec![9.0, 9.0, 9.0]]);
    }

    #[test]
    fn delete_removes_both_artifacts() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        store.save(&sample_record("b.txt")).unwrap();
        store.delete("b.txt").unwrap();
        assert!(store.load("b.txt").unwrap().is_none());
        assert_eq!(store.storage_bytes().unwrap(), 0);
    }

    #[test]
    fn delete_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store.delete("nothing/here.txt").unwrap();
    }

    #[test]
    fn truncated_blob_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        store.save(&sample_record("c.txt")).unwrap();
        let key = VectorStore::storage_key("c.txt");
        let vec_path = tmp
            .path()
            .join(".semdex/embeddings")
            .join(format!("{}.vec", key));
        std::fs::write(&vec_path, [0u8; 5]).unwrap();

        assert!(store.load("c.txt").is_err());
    }

    #[test]
    fn storage_keys_differ_per_path() {
        assert_ne!(
            VectorStore::storage_key("a.txt"),
            VectorStore::storage_key("b.txt")
        );
        assert_eq!(VectorStore::storage_key("a.txt").len(), 64);
    }
}
