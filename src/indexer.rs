//! Indexing orchestration.
//!
//! [`Indexer`] ties the components together: discover candidate files, skip
//! the unchanged ones via the change tracker, extract and chunk content,
//! embed, then persist in a fixed order. Per file the order is vector store
//! first, then the file table, then the search index, so a crash between
//! steps leaves at worst a stale search entry that the next run repairs.
//! Removal runs the same order reversed.
//!
//! One indexing job runs at a time. Interactive runs hold the job slot for
//! the duration of [`Indexer::index_path`]; background runs take it in
//! [`Indexer::spawn_background`] and report through a [`ProgressHandle`].

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::{chunker_from_config, Chunker};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::IndexError;
use crate::extract::{self, FileKind};
use crate::progress::{JobStatus, ProgressEvent, ProgressHandle, ProgressReporter};
use crate::repo::Repository;
use crate::search_index::{SearchHit, SearchIndex};
use crate::tracker::{hash_file, ChangeTracker, FileRecord, FileStat};
use crate::vector_store::{VectorRecord, VectorStore};

/// Options for one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Reindex every file regardless of change detection.
    pub force: bool,
    /// Override the configured extension filter for this run.
    pub extensions: Option<Vec<String>>,
}

/// What happened to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { chunks: usize },
    Skipped,
}

/// Summary of an indexing run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub elapsed: Duration,
}

/// Repository-level statistics for `status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub root: PathBuf,
    pub file_count: i64,
    pub text_files: i64,
    pub chunk_count: i64,
    pub storage_bytes: u64,
    pub model: Option<String>,
    pub embedding_dim: Option<i64>,
}

pub struct Indexer {
    repo: Repository,
    tracker: ChangeTracker,
    store: VectorStore,
    index: Mutex<SearchIndex>,
    provider: Box<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
    extensions: Vec<String>,
    exclude: GlobSet,
    batch_size: usize,
    in_flight: Arc<AtomicBool>,
}

impl Indexer {
    /// Open an indexer over an existing repository.
    ///
    /// Verifies that the provider matches the model identity recorded in the
    /// repository, recording it on first use. A mismatch is fatal: vectors
    /// from different models are not comparable.
    pub async fn open(
        repo: Repository,
        config: &Config,
        provider: Box<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let pool = repo.open_database().await?;

        if provider.dims() > 0 {
            verify_model_identity(&pool, provider.model_name(), provider.dims() as i64).await?;
        }

        let tracker = ChangeTracker::new(pool);
        let store = VectorStore::new(&repo);

        let mut index = SearchIndex::new(&repo);
        if let Err(e) = index.load() {
            match e {
                IndexError::CorruptIndex(reason) => {
                    warn!(%reason, "search index unreadable, rebuilding");
                    index.rebuild(&tracker, &store).await?;
                }
                other => return Err(other.into()),
            }
        }

        let chunker = chunker_from_config(&config.chunking)?;

        let mut builder = GlobSetBuilder::new();
        for pattern in &config.indexing.exclude {
            builder.add(Glob::new(pattern)?);
        }
        let exclude = builder.build()?;

        Ok(Self {
            repo,
            tracker,
            store,
            index: Mutex::new(index),
            provider,
            chunker,
            extensions: config.indexing.extensions.clone(),
            exclude,
            batch_size: config.embedding.batch_size.max(1),
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Whether a job currently holds the indexing slot.
    pub fn is_indexing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Index a file or directory tree, blocking until done.
    pub async fn index_path(
        &self,
        path: &Path,
        options: &IndexOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        let _slot = self.take_slot()?;
        self.run(path, options, reporter, None).await
    }

    /// Start an indexing job on a background task.
    ///
    /// Fails immediately if a job is already running; otherwise returns a
    /// handle to poll for progress and the join handle for the final report.
    pub fn spawn_background(
        self: &Arc<Self>,
        path: PathBuf,
        options: IndexOptions,
    ) -> Result<(ProgressHandle, tokio::task::JoinHandle<Result<BatchReport>>)> {
        let slot = self.take_slot()?;
        let progress = ProgressHandle::new();

        let indexer = Arc::clone(self);
        let handle_for_task = progress.clone();
        let join = tokio::spawn(async move {
            let _slot = slot;
            let result = indexer
                .run(
                    &path,
                    &options,
                    &crate::progress::NoProgress,
                    Some(&handle_for_task),
                )
                .await;
            match &result {
                Ok(_) => handle_for_task.finish(JobStatus::Completed),
                Err(_) => handle_for_task.finish(JobStatus::Error),
            }
            result
        });

        Ok((progress, join))
    }

    fn take_slot(&self) -> Result<FlightSlot> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            anyhow::bail!("an indexing job is already running");
        }
        Ok(FlightSlot {
            flag: Arc::clone(&self.in_flight),
        })
    }

    async fn run(
        &self,
        path: &Path,
        options: &IndexOptions,
        reporter: &dyn ProgressReporter,
        progress: Option<&ProgressHandle>,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        reporter.report(ProgressEvent::Discovering);

        let extensions = options.extensions.as_ref().unwrap_or(&self.extensions);
        let candidates = self.discover(path, extensions)?;

        if let Some(p) = progress {
            p.begin(candidates.len() as u64);
        }
        info!(files = candidates.len(), path = %path.display(), "indexing");

        let mut report = BatchReport {
            total: candidates.len(),
            indexed: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        };

        for (n, file) in candidates.iter().enumerate() {
            reporter.report(ProgressEvent::Indexing {
                n: (n + 1) as u64,
                total: candidates.len() as u64,
                path: file.display().to_string(),
            });

            match self.index_file(file, options.force).await {
                Ok(FileOutcome::Indexed { .. }) => {
                    report.indexed += 1;
                    if let Some(p) = progress {
                        p.advance(false);
                    }
                }
                Ok(FileOutcome::Skipped) => {
                    report.skipped += 1;
                    if let Some(p) = progress {
                        p.advance(false);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "file failed");
                    report.failed += 1;
                    report.errors.push(e.to_string());
                    if let Some(p) = progress {
                        p.advance(true);
                    }
                }
            }
        }

        if path.is_dir() {
            self.remove_vanished(path).await?;
        }

        report.elapsed = started.elapsed();
        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            "indexing finished"
        );
        Ok(report)
    }

    /// Collect indexable files under `path`, sorted for deterministic runs.
    fn discover(&self, path: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
        let start = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let root = self.repo.root().to_path_buf();
        let mut files = Vec::new();

        for entry in WalkDir::new(&start).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "walk error");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let p = entry.path();
            if self.repo.is_internal(p) {
                continue;
            }
            let Some(ext) = extract::extension_of(p) else {
                continue;
            };
            if !extensions.contains(&ext) {
                continue;
            }
            if let Ok(rel) = p.strip_prefix(&root) {
                if self.exclude.is_match(rel) {
                    continue;
                }
            }
            files.push(p.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    /// Index one file, persisting vector store, file table, and search index
    /// in that order.
    async fn index_file(&self, path: &Path, force: bool) -> Result<FileOutcome, IndexError> {
        let Some(kind) = extract::classify(path) else {
            return Ok(FileOutcome::Skipped);
        };

        let stat = FileStat::from_path(path)?;
        if !force {
            let needs = self
                .tracker
                .needs_index(&stat)
                .await
                .map_err(|e| IndexError::transient(path, e))?;
            if !needs {
                return Ok(FileOutcome::Skipped);
            }
        }

        let content_hash = hash_file(path)?;

        let (chunks, vectors, is_text) = match kind {
            FileKind::Text => {
                let text = extract::extract_text(path)?;
                let chunks = self.chunker.chunk(&text);
                let vectors = self.embed_chunks(path, &chunks).await?;
                (chunks, vectors, true)
            }
            FileKind::Image => {
                let bytes = extract::read_bytes(path)?;
                let vector = self
                    .provider
                    .embed_image(&bytes)
                    .await
                    .map_err(|e| IndexError::embedding(path, e))?;
                let label = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (vec![label], vec![vector], false)
            }
        };

        let record = VectorRecord {
            path: stat.path.clone(),
            model: self.provider.model_name().to_string(),
            dims: self.provider.dims(),
            chunks: chunks.clone(),
            vectors: vectors.clone(),
        };
        self.store
            .save(&record)
            .map_err(|e| IndexError::transient(path, e))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.tracker
            .record(&FileRecord {
                path: stat.path.clone(),
                content_hash,
                byte_size: stat.byte_size,
                modified_time: stat.modified_time,
                indexed_time: now,
                extension: extract::extension_of(path).unwrap_or_default(),
                is_text,
                chunk_count: chunks.len() as i64,
                embedding_dim: self.provider.dims() as i64,
            })
            .await
            .map_err(|e| IndexError::transient(path, e))?;

        let mut index = self.index.lock().await;
        if chunks.is_empty() {
            index.remove(&stat.path)?;
        } else {
            index.add(&stat.path, &chunks, &vectors)?;
        }

        Ok(FileOutcome::Indexed {
            chunks: chunks.len(),
        })
    }

    async fn embed_chunks(
        &self,
        path: &Path,
        chunks: &[String],
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let mut batch_vectors = self
                .provider
                .embed_batch(batch)
                .await
                .map_err(|e| IndexError::embedding(path, e))?;
            if batch_vectors.len() != batch.len() {
                return Err(IndexError::embedding(
                    path,
                    format!(
                        "provider returned {} vectors for {} chunks",
                        batch_vectors.len(),
                        batch.len()
                    ),
                ));
            }
            vectors.append(&mut batch_vectors);
        }
        Ok(vectors)
    }

    /// Drop tracked files under `scope` that no longer exist on disk or are
    /// now excluded by the configured filters.
    async fn remove_vanished(&self, scope: &Path) -> Result<()> {
        let scope = scope.canonicalize().unwrap_or_else(|_| scope.to_path_buf());
        let root = self.repo.root().to_path_buf();

        for tracked in self.tracker.all_paths().await? {
            let tracked_path = Path::new(&tracked);
            if !tracked_path.starts_with(&scope) {
                continue;
            }

            let excluded = tracked_path
                .strip_prefix(&root)
                .map(|rel| self.exclude.is_match(rel))
                .unwrap_or(false);
            let ext_allowed = extract::extension_of(tracked_path)
                .map(|ext| self.extensions.contains(&ext))
                .unwrap_or(false);
            if tracked_path.exists() && ext_allowed && !excluded {
                continue;
            }

            info!(path = %tracked, "removing vanished file");
            self.remove_file(&tracked).await?;
        }
        Ok(())
    }

    /// Remove one file from all stores, search index first.
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        {
            let mut index = self.index.lock().await;
            index.remove(path).map_err(|e| anyhow::anyhow!("{}", e))?;
        }
        self.tracker.remove(path).await?;
        self.store.delete(path)?;
        Ok(())
    }

    /// Embed the query and rank it against the whole index.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let query_vector = self.provider.embed(query).await?;
        let index = self.index.lock().await;
        index
            .search(&query_vector, top_k)
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let records = self.tracker.all_records().await?;
        let model = records.first().map(|_| self.provider.model_name().to_string());
        let embedding_dim = records.first().map(|r| r.embedding_dim);

        Ok(StatusReport {
            root: self.repo.root().to_path_buf(),
            file_count: self.tracker.count().await?,
            text_files: self.tracker.text_file_count().await?,
            chunk_count: self.tracker.chunk_total().await?,
            storage_bytes: self.store.storage_bytes()?,
            model,
            embedding_dim,
        })
    }

    /// All tracked files, optionally filtered by extension.
    pub async fn list(&self, extension: Option<&str>) -> Result<Vec<FileRecord>> {
        let mut records = self.tracker.all_records().await?;
        if let Some(ext) = extension {
            let ext = ext.to_lowercase();
            records.retain(|r| r.extension == ext);
        }
        Ok(records)
    }
}

/// Releases the single-job slot when dropped.
struct FlightSlot {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightSlot {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

async fn verify_model_identity(
    pool: &sqlx::sqlite::SqlitePool,
    model: &str,
    dims: i64,
) -> Result<()> {
    let row = sqlx::query("SELECT model, dims FROM model_info WHERE id = 1")
        .fetch_optional(pool)
        .await?;

    match row {
        None => {
            sqlx::query("INSERT INTO model_info (id, model, dims) VALUES (1, ?, ?)")
                .bind(model)
                .bind(dims)
                .execute(pool)
                .await?;
            Ok(())
        }
        Some(row) => {
            let stored_model: String = row.get("model");
            let stored_dims: i64 = row.get("dims");
            if stored_model != model || stored_dims != dims {
                return Err(IndexError::Configuration(format!(
                    "repository was indexed with {} ({} dims) but the configured provider \
                     is {} ({} dims); reindex with --force after clearing the repository",
                    stored_model, stored_dims, model, dims
                ))
                .into());
            }
            Ok(())
        }
    }
}
