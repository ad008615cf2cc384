//! Change tracking over the SQLite file table.
//!
//! One row per indexed file records the fingerprint taken when it was last
//! indexed (content hash, byte size, modified time) plus bookkeeping columns
//! used by `status` and `list`. [`ChangeTracker::needs_index`] compares the
//! current filesystem state against the stored row, using the cheap
//! signals (size, mtime) first and falling back to the content hash only
//! when both match.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::IndexError;

/// A row of the `file_index` table.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    pub content_hash: String,
    pub byte_size: i64,
    /// Filesystem modified time, seconds since the Unix epoch.
    pub modified_time: i64,
    /// When this row was written, seconds since the Unix epoch.
    pub indexed_time: i64,
    pub extension: String,
    pub is_text: bool,
    pub chunk_count: i64,
    pub embedding_dim: i64,
}

/// A file's current on-disk identity, read without hashing.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub path: String,
    pub byte_size: i64,
    pub modified_time: i64,
}

impl FileStat {
    pub fn from_path(path: &Path) -> Result<FileStat, IndexError> {
        let metadata = std::fs::metadata(path).map_err(|e| IndexError::transient(path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| IndexError::transient(path, e))?;
        let modified_time = modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(FileStat {
            path: path.to_string_lossy().to_string(),
            byte_size: metadata.len() as i64,
            modified_time,
        })
    }
}

/// Streaming SHA-256 of a file's content, hex-encoded.
pub fn hash_file(path: &Path) -> Result<String, IndexError> {
    let file = std::fs::File::open(path).map_err(|e| IndexError::transient(path, e))?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| IndexError::transient(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct ChangeTracker {
    pool: SqlitePool,
}

impl ChangeTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT path, content_hash, byte_size, modified_time, indexed_time,
                    extension, is_text, chunk_count, embedding_dim
             FROM file_index WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(record_from_row))
    }

    /// Decide whether a file must be (re)indexed.
    ///
    /// Absent rows always index. For existing rows the size and mtime are
    /// checked first; the content hash is only computed when both match, and
    /// it is authoritative.
    pub async fn needs_index(&self, stat: &FileStat) -> Result<bool> {
        let Some(record) = self.get(&stat.path).await? else {
            return Ok(true);
        };

        if record.byte_size != stat.byte_size {
            debug!(path = %stat.path, "size changed");
            return Ok(true);
        }
        if record.modified_time < stat.modified_time {
            debug!(path = %stat.path, "mtime newer");
            return Ok(true);
        }

        let current_hash = hash_file(Path::new(&stat.path))
            .map_err(|e| anyhow::anyhow!("hashing {}: {}", stat.path, e))?;
        Ok(current_hash != record.content_hash)
    }

    /// Insert or replace the row for a file.
    pub async fn record(&self, record: &FileRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO file_index
                (path, content_hash, byte_size, modified_time, indexed_time,
                 extension, is_text, chunk_count, embedding_dim)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.path)
        .bind(&record.content_hash)
        .bind(record.byte_size)
        .bind(record.modified_time)
        .bind(record.indexed_time)
        .bind(&record.extension)
        .bind(record.is_text)
        .bind(record.chunk_count)
        .bind(record.embedding_dim)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM file_index WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn all_paths(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT path FROM file_index ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("path")).collect())
    }

    pub async fn all_records(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT path, content_hash, byte_size, modified_time, indexed_time,
                    extension, is_text, chunk_count, embedding_dim
             FROM file_index ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_from_row).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM file_index")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn text_file_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM file_index WHERE is_text = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn chunk_total(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(SUM(chunk_count), 0) AS n FROM file_index")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        path: row.get("path"),
        content_hash: row.get("content_hash"),
        byte_size: row.get("byte_size"),
        modified_time: row.get("modified_time"),
        indexed_time: row.get("indexed_time"),
        extension: row.get("extension"),
        is_text: row.get::<i64, _>("is_text") != 0,
        chunk_count: row.get("chunk_count"),
        embedding_dim: row.get("embedding_dim"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Repository;
    use tempfile::TempDir;

    async fn tracker_in(tmp: &TempDir) -> ChangeTracker {
        let repo = Repository::init(tmp.path()).unwrap();
        ChangeTracker::new(repo.open_database().await.unwrap())
    }

    fn record_for(stat: &FileStat, hash: &str) -> FileRecord {
        FileRecord {
            path: stat.path.clone(),
            content_hash: hash.to_string(),
            byte_size: stat.byte_size,
            modified_time: stat.modified_time,
            indexed_time: stat.modified_time,
            extension: ".txt".to_string(),
            is_text: true,
            chunk_count: 1,
            embedding_dim: 8,
        }
    }

    #[tokio::test]
    async fn untracked_file_needs_index() {
        let tmp = TempDir::new().unwrap();
        let tracker = tracker_in(&tmp).await;

        let path = tmp.path().join("new.txt");
        std::fs::write(&path, "hello").unwrap();
        let stat = FileStat::from_path(&path).unwrap();
        assert!(tracker.needs_index(&stat).await.unwrap());
    }

    #[tokio::test]
    async fn unchanged_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let tracker = tracker_in(&tmp).await;

        let path = tmp.path().join("stable.txt");
        std::fs::write(&path, "same contents").unwrap();
        let stat = FileStat::from_path(&path).unwrap();
        let hash = hash_file(&path).unwrap();

        tracker.record(&record_for(&stat, &hash)).await.unwrap();
        assert!(!tracker.needs_index(&stat).await.unwrap());
    }

    #[tokio::test]
    async fn size_change_triggers_reindex() {
        let tmp = TempDir::new().unwrap();
        let tracker = tracker_in(&tmp).await;

        let path = tmp.path().join("grow.txt");
        std::fs::write(&path, "short").unwrap();
        let stat = FileStat::from_path(&path).unwrap();
        let hash = hash_file(&path).unwrap();
        tracker.record(&record_for(&stat, &hash)).await.unwrap();

        std::fs::write(&path, "much longer contents now").unwrap();
        let stat = FileStat::from_path(&path).unwrap();
        assert!(tracker.needs_index(&stat).await.unwrap());
    }

    #[tokio::test]
    async fn hash_is_authoritative_when_size_and_mtime_match() {
        let tmp = TempDir::new().unwrap();
        let tracker = tracker_in(&tmp).await;

        let path = tmp.path().join("swap.txt");
        std::fs::write(&path, "aaaa").unwrap();
        let stat = FileStat::from_path(&path).unwrap();

        // Stored row matches size and mtime but carries a different hash.
        tracker
            .record(&record_for(&stat, "deadbeef"))
            .await
            .unwrap();
        assert!(tracker.needs_index(&stat).await.unwrap());
    }

    #[tokio::test]
    async fn remove_deletes_row() {
        let tmp = TempDir::new().unwrap();
        let tracker = tracker_in(&tmp).await;

        let path = tmp.path().join("gone.txt");
        std::fs::write(&path, "bye").unwrap();
        let stat = FileStat::from_path(&path).unwrap();
        let hash = hash_file(&path).unwrap();
        tracker.record(&record_for(&stat, &hash)).await.unwrap();
        assert_eq!(tracker.count().await.unwrap(), 1);

        tracker.remove(&stat.path).await.unwrap();
        assert_eq!(tracker.count().await.unwrap(), 0);
        assert!(tracker.get(&stat.path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_replaces_existing_row() {
        let tmp = TempDir::new().unwrap();
        let tracker = tracker_in(&tmp).await;

        let path = tmp.path().join("twice.txt");
        std::fs::write(&path, "v1").unwrap();
        let stat = FileStat::from_path(&path).unwrap();
        tracker.record(&record_for(&stat, "hash1")).await.unwrap();

        let mut updated = record_for(&stat, "hash2");
        updated.chunk_count = 7;
        tracker.record(&updated).await.unwrap();

        assert_eq!(tracker.count().await.unwrap(), 1);
        let row = tracker.get(&stat.path).await.unwrap().unwrap();
        assert_eq!(row.content_hash, "hash2");
        assert_eq!(row.chunk_count, 7);
    }

    #[test]
    fn hash_file_is_stable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("h.txt");
        std::fs::write(&path, "content").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_file(&path).unwrap());
        assert_eq!(hash_file(&path).unwrap().len(), 64);
    }
}
