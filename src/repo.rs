//! Repository discovery and layout.
//!
//! A semdex repository is a `.semdex` directory at the root of the tree being
//! indexed, found git-style by walking up from a start path. It holds three
//! persisted stores:
//!
//! ```text
//! .semdex/
//!   index/              file table (SQLite) + combined search index
//!     index.db
//!     search_index.bin
//!     search_metadata.json
//!   embeddings/         one vector blob per indexed file
//!   metadata/           one JSON sidecar per indexed file
//! ```

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub const REPO_DIR_NAME: &str = ".semdex";
const INDEX_DIR_NAME: &str = "index";
const EMBEDDINGS_DIR_NAME: &str = "embeddings";
const METADATA_DIR_NAME: &str = "metadata";
const INDEX_DB_NAME: &str = "index.db";
const SEARCH_INDEX_NAME: &str = "search_index.bin";
const SEARCH_METADATA_NAME: &str = "search_metadata.json";

#[derive(Debug, Clone)]
pub struct Repository {
    repo_dir: PathBuf,
}

impl Repository {
    /// Walk up from `start` looking for an existing `.semdex` directory.
    pub fn discover(start: &Path) -> Option<Repository> {
        let mut current = start.canonicalize().ok()?;
        loop {
            let candidate = current.join(REPO_DIR_NAME);
            if candidate.is_dir() {
                debug!(repo = %candidate.display(), "found repository");
                return Some(Repository {
                    repo_dir: candidate,
                });
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create a repository at `location` (idempotent), returning it.
    pub fn init(location: &Path) -> Result<Repository> {
        std::fs::create_dir_all(location)?;
        // Canonical paths keep file identity stable across runs.
        let location = location.canonicalize()?;
        let repo_dir = location.join(REPO_DIR_NAME);
        let created = !repo_dir.exists();

        let repo = Repository { repo_dir };
        std::fs::create_dir_all(repo.index_dir())?;
        std::fs::create_dir_all(repo.embeddings_dir())?;
        std::fs::create_dir_all(repo.metadata_dir())?;

        if created {
            info!(repo = %repo.repo_dir.display(), "repository created");
        } else {
            debug!(repo = %repo.repo_dir.display(), "repository already exists");
        }
        Ok(repo)
    }

    /// Discover an existing repository or fail with a user-facing error.
    pub fn open(start: &Path) -> Result<Repository> {
        Repository::discover(start).ok_or_else(|| {
            anyhow::anyhow!(
                "No {} repository found starting from {}. Run `sdx init` first.",
                REPO_DIR_NAME,
                start.display()
            )
        })
    }

    /// Root of the indexed tree (parent of `.semdex`).
    pub fn root(&self) -> &Path {
        self.repo_dir.parent().unwrap_or(&self.repo_dir)
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn index_dir(&self) -> PathBuf {
        self.repo_dir.join(INDEX_DIR_NAME)
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.repo_dir.join(EMBEDDINGS_DIR_NAME)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.repo_dir.join(METADATA_DIR_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.index_dir().join(INDEX_DB_NAME)
    }

    pub fn search_index_path(&self) -> PathBuf {
        self.index_dir().join(SEARCH_INDEX_NAME)
    }

    pub fn search_metadata_path(&self) -> PathBuf {
        self.index_dir().join(SEARCH_METADATA_NAME)
    }

    /// Whether `path` lies inside the repository's own storage tree.
    pub fn is_internal(&self, path: &Path) -> bool {
        path.starts_with(&self.repo_dir)
    }

    /// Open the file-table database, creating the schema if needed.
    pub async fn open_database(&self) -> Result<SqlitePool> {
        if let Some(parent) = self.db_path().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", self.db_path().display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        Ok(pool)
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_index (
            path TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            byte_size INTEGER NOT NULL,
            modified_time INTEGER NOT NULL,
            indexed_time INTEGER NOT NULL,
            extension TEXT NOT NULL,
            is_text INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            embedding_dim INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_index_hash ON file_index(content_hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_index_extension ON file_index(extension)")
        .execute(pool)
        .await?;

    // Declared embedding-model identity for this repository (single row).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_info (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            model TEXT NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
