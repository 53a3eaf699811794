//! Acquisition history storage
//!
//! History is append-only: entries are never updated or removed, and recording
//! the same release twice is harmless.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::HistoryRepository;
use crate::quality::{Quality, QualityTier};

/// One accepted release for one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub episode_id: i64,
    pub quality: QualityTier,
    pub is_proper: bool,
    pub release_title: String,
    pub indexer: String,
    pub acquired_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(episode_id: i64, quality: Quality, release_title: &str, indexer: &str) -> Self {
        Self {
            episode_id,
            quality: quality.tier,
            is_proper: quality.is_proper,
            release_title: release_title.to_string(),
            indexer: indexer.to_string(),
            acquired_at: Utc::now(),
        }
    }

    pub fn full_quality(&self) -> Quality {
        Quality::new(self.quality, self.is_proper)
    }
}

/// History kept in process memory
#[derive(Debug, Default)]
pub struct MemoryHistoryRepository {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistoryRepository {
    async fn exists(&self, episode_id: i64, quality: Quality) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .iter()
            .any(|e| e.episode_id == episode_id && e.full_quality() == quality))
    }

    async fn add(&self, entry: &HistoryEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    async fn list_for_episode(&self, episode_id: i64) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.episode_id == episode_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    episode_id: i64,
    quality: String,
    is_proper: bool,
    release_title: String,
    indexer: String,
    acquired_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = anyhow::Error;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(Self {
            episode_id: row.episode_id,
            quality: QualityTier::from_str(&row.quality)?,
            is_proper: row.is_proper,
            release_title: row.release_title,
            indexer: row.indexer,
            acquired_at: row.acquired_at,
        })
    }
}

/// History persisted in a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and ensure the schema exists
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid history database URL: {}", url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open history database {}", url))?;

        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id INTEGER NOT NULL,
                quality TEXT NOT NULL,
                is_proper INTEGER NOT NULL,
                release_title TEXT NOT NULL,
                indexer TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create history table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_episode ON history (episode_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create history index")?;

        Ok(())
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn exists(&self, episode_id: i64, quality: Quality) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM history
                WHERE episode_id = ? AND quality = ? AND is_proper = ?
            )
            "#,
        )
        .bind(episode_id)
        .bind(quality.tier.to_string())
        .bind(quality.is_proper)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn add(&self, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history (episode_id, quality, is_proper, release_title, indexer, acquired_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.episode_id)
        .bind(entry.quality.to_string())
        .bind(entry.is_proper)
        .bind(&entry.release_title)
        .bind(&entry.indexer)
        .bind(entry.acquired_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_episode(&self, episode_id: i64) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT episode_id, quality, is_proper, release_title, indexer, acquired_at
            FROM history
            WHERE episode_id = ?
            ORDER BY acquired_at, id
            "#,
        )
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }
}
