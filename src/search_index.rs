//! Combined in-memory similarity index.
//!
//! All chunk vectors across all files live in one flat f32 matrix with a
//! parallel row-metadata list, so a search is a single normalized dot product
//! over every row. Both sides persist next to the SQLite database:
//! `search_index.bin` (little-endian f32 rows) and `search_metadata.json`
//! (dimension plus per-row path, chunk index, and text). The index is saved
//! after every mutation.
//!
//! The index is a cache. If either file is missing, truncated, or out of sync
//! with the other, loading reports [`IndexError::CorruptIndex`] and the
//! caller rebuilds from the vector store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::IndexError;
use crate::repo::Repository;
use crate::tracker::ChangeTracker;
use crate::vector_store::VectorStore;

/// One search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub chunk_index: usize,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RowMeta {
    path: String,
    chunk_index: usize,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    dims: Option<usize>,
    rows: Vec<RowMeta>,
}

pub struct SearchIndex {
    vectors_path: PathBuf,
    metadata_path: PathBuf,
    /// Set by the first added vector; all later rows must match.
    dims: Option<usize>,
    /// Row-major, `rows.len() * dims` elements.
    vectors: Vec<f32>,
    rows: Vec<RowMeta>,
}

impl SearchIndex {
    pub fn new(repo: &Repository) -> Self {
        Self {
            vectors_path: repo.search_index_path(),
            metadata_path: repo.search_metadata_path(),
            dims: None,
            vectors: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Load the persisted index, if any.
    ///
    /// An absent index is an empty one. Present-but-inconsistent files are
    /// reported as [`IndexError::CorruptIndex`] so the caller can rebuild.
    pub fn load(&mut self) -> Result<(), IndexError> {
        let meta_exists = self.metadata_path.exists();
        let vec_exists = self.vectors_path.exists();

        if !meta_exists && !vec_exists {
            return Ok(());
        }
        if meta_exists != vec_exists {
            return Err(IndexError::CorruptIndex(
                "search index files are incomplete".to_string(),
            ));
        }

        let manifest: Manifest = serde_json::from_slice(
            &std::fs::read(&self.metadata_path)
                .map_err(|e| IndexError::CorruptIndex(e.to_string()))?,
        )
        .map_err(|e| IndexError::CorruptIndex(format!("search metadata: {}", e)))?;

        let blob = std::fs::read(&self.vectors_path)
            .map_err(|e| IndexError::CorruptIndex(e.to_string()))?;

        let dims = manifest.dims.unwrap_or(0);
        let expected = manifest.rows.len() * dims * 4;
        if blob.len() != expected {
            return Err(IndexError::CorruptIndex(format!(
                "search vectors are {} bytes, expected {}",
                blob.len(),
                expected
            )));
        }

        self.dims = manifest.dims;
        self.rows = manifest.rows;
        self.vectors = blob_to_vec(&blob);
        debug!(rows = self.rows.len(), "search index loaded");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace all entries for `path` with the given chunks and vectors.
    pub fn add(
        &mut self,
        path: &str,
        chunks: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), IndexError> {
        self.remove_rows(path);

        for (i, (text, vector)) in chunks.iter().zip(vectors.iter()).enumerate() {
            match self.dims {
                None => self.dims = Some(vector.len()),
                Some(dims) if dims != vector.len() => {
                    return Err(IndexError::Configuration(format!(
                        "vector dimension {} does not match index dimension {}",
                        vector.len(),
                        dims
                    )));
                }
                Some(_) => {}
            }
            self.vectors.extend_from_slice(vector);
            self.rows.push(RowMeta {
                path: path.to_string(),
                chunk_index: i,
                text: text.clone(),
            });
        }

        self.save().map_err(|e| {
            IndexError::CorruptIndex(format!("failed to persist search index: {}", e))
        })
    }

    /// Remove all entries for `path`. Saves only if something was removed.
    pub fn remove(&mut self, path: &str) -> Result<(), IndexError> {
        if self.remove_rows(path) == 0 {
            return Ok(());
        }
        self.save().map_err(|e| {
            IndexError::CorruptIndex(format!("failed to persist search index: {}", e))
        })
    }

    fn remove_rows(&mut self, path: &str) -> usize {
        let dims = self.dims.unwrap_or(0);
        let before = self.rows.len();

        let mut kept_vectors = Vec::with_capacity(self.vectors.len());
        let mut kept_rows = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            if row.path != path {
                kept_vectors.extend_from_slice(&self.vectors[i * dims..(i + 1) * dims]);
                kept_rows.push(row.clone());
            }
        }
        self.vectors = kept_vectors;
        self.rows = kept_rows;

        before - self.rows.len()
    }

    /// Rank all rows against a query vector and return the top `top_k`.
    ///
    /// Results are ordered by descending score; ties break by path then
    /// chunk index so results are stable across runs.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.rows.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let dims = self.dims.unwrap_or(0);
        if query.len() != dims {
            return Err(IndexError::Configuration(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                dims
            )));
        }

        let query_norm = query.iter().map(|x| x * x).sum::<f32>().sqrt();
        if query_norm < f32::EPSILON {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let vector = &self.vectors[i * dims..(i + 1) * dims];
                let mut dot = 0.0f32;
                let mut norm = 0.0f32;
                for (q, v) in query.iter().zip(vector.iter()) {
                    dot += q * v;
                    norm += v * v;
                }
                let norm = norm.sqrt();
                let score = if norm < f32::EPSILON {
                    0.0
                } else {
                    dot / (query_norm * norm)
                };
                SearchHit {
                    path: row.path.clone(),
                    chunk_index: row.chunk_index,
                    text: row.text.clone(),
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Write both files, temp-and-rename. An empty index is persisted too.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.vectors_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manifest = Manifest {
            dims: self.dims,
            rows: self.rows.clone(),
        };

        write_atomic(&self.vectors_path, &vec_to_blob(&self.vectors))?;
        write_atomic(&self.metadata_path, &serde_json::to_vec(&manifest)?)?;
        Ok(())
    }

    /// Discard in-memory state and repopulate from the durable stores.
    pub async fn rebuild(&mut self, tracker: &ChangeTracker, store: &VectorStore) -> Result<()> {
        self.dims = None;
        self.vectors.clear();
        self.rows.clear();

        let paths = tracker.all_paths().await?;
        for path in &paths {
            if let Some(record) = store.load(path)? {
                self.add(path, &record.chunks, &record.vectors)
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
            }
        }
        self.save()?;
        info!(files = paths.len(), rows = self.rows.len(), "search index rebuilt");
        Ok(())
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

    fn index_in(tmp: &TempDir) -> SearchIndex {
        let repo = Repository::init(tmp.path()).unwrap();
        SearchIndex::new(&repo)
    }

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_index_returns_no_hits() {
        let tmp = TempDir::new().unwrap();
        let index = index_in(&tmp);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn results_sorted_by_score_descending() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);

        index
            .add(
                "a.txt",
                &chunks(&["exact", "orthogonal", "opposite"]),
                &[
                    vec![1.0, 0.0],
                    vec![0.0, 1.0],
                    vec![-1.0, 0.0],
                ],
            )
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "exact");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[2].text, "opposite");
        assert!((hits[2].score + 1.0).abs() < 1e-6);
        assert!(hits.iter().all(|h| h.score >= -1.0 && h.score <= 1.0));
    }

    #[test]
    fn ties_break_by_path_then_chunk_index() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);

        index
            .add("b.txt", &chunks(&["b0"]), &[vec![1.0, 0.0]])
            .unwrap();
        index
            .add("a.txt", &chunks(&["a0", "a1"]), &[vec![1.0, 0.0], vec![1.0, 0.0]])
            .unwrap();

        let hits = index.search(&[2.0, 0.0], 10).unwrap();
        let order: Vec<(&str, usize)> = hits
            .iter()
            .map(|h| (h.path.as_str(), h.chunk_index))
            .collect();
        assert_eq!(order, vec![("a.txt", 0), ("a.txt", 1), ("b.txt", 0)]);
    }

    #[test]
    fn top_k_larger_than_index_returns_all() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        index
            .add("a.txt", &chunks(&["one", "two"]), &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        assert_eq!(index.search(&[1.0, 1.0], 100).unwrap().len(), 2);
    }

    #[test]
    fn add_replaces_existing_entries_for_path() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);

        index
            .add("a.txt", &chunks(&["old1", "old2"]), &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        index.add("a.txt", &chunks(&["new"]), &[vec![0.5, 0.5]]).unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.search(&[1.0, 1.0], 10).unwrap();
        assert_eq!(hits[0].text, "new");
        assert_eq!(hits[0].chunk_index, 0);
    }

    #[test]
    fn remove_drops_only_named_path() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);

        index.add("a.txt", &chunks(&["a"]), &[vec![1.0, 0.0]]).unwrap();
        index.add("b.txt", &chunks(&["b"]), &[vec![0.0, 1.0]]).unwrap();
        index.remove("a.txt").unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.search(&[0.0, 1.0], 10).unwrap();
        assert_eq!(hits[0].path, "b.txt");
    }

    #[test]
    fn mismatched_vector_dimension_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        index.add("a.txt", &chunks(&["a"]), &[vec![1.0, 0.0]]).unwrap();

        let err = index
            .add("b.txt", &chunks(&["b"]), &[vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, IndexError::Configuration(_)));
    }

    #[test]
    fn mismatched_query_dimension_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        index.add("a.txt", &chunks(&["a"]), &[vec![1.0, 0.0]]).unwrap();

        let err = index.search(&[1.0, 0.0, 0.0], 5).unwrap_err();
        assert!(matches!(err, IndexError::Configuration(_)));
    }

    #[test]
    fn zero_norm_query_returns_no_hits() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        index.add("a.txt", &chunks(&["a"]), &[vec![1.0, 0.0]]).unwrap();
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn persists_and_reloads() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();

        let mut index = SearchIndex::new(&repo);
        index
            .add("a.txt", &chunks(&["hello", "world"]), &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();

        let mut reloaded = SearchIndex::new(&repo);
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        let hits = reloaded.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].text, "hello");
    }

    #[test]
    fn truncated_vector_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();

        let mut index = SearchIndex::new(&repo);
        index.add("a.txt", &chunks(&["a"]), &[vec![1.0, 0.0]]).unwrap();

        std::fs::write(repo.search_index_path(), [0u8; 3]).unwrap();

        let mut reloaded = SearchIndex::new(&repo);
        let err = reloaded.load().unwrap_err();
        assert!(matches!(err, IndexError::CorruptIndex(_)));
    }

    #[test]
    fn missing_metadata_with_present_vectors_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();

        let mut index = SearchIndex::new(&repo);
        index.add("a.txt", &chunks(&["a"]), &[vec![1.0, 0.0]]).unwrap();
        std::fs::remove_file(repo.search_metadata_path()).unwrap();

        let mut reloaded = SearchIndex::new(&repo);
        assert!(matches!(
            reloaded.load().unwrap_err(),
            IndexError::CorruptIndex(_)
        ));
    }
}
