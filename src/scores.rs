//! Score history.
//!
//! The game runner records finished games through the [`ScoreStore`] trait;
//! the server picks the backing store at startup.

use crate::types::ScoreEntry;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

pub type ScoreResult<T> = Result<T, ScoreStoreError>;

#[derive(Debug, thiserror::Error)]
pub enum ScoreStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt score file: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistent, ordered score history
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Record a finished game
    async fn append(&self, entry: ScoreEntry) -> ScoreResult<()>;

    /// All entries, highest score first; equal scores keep insertion order
    async fn list(&self) -> ScoreResult<Vec<ScoreEntry>>;

    /// Forget every entry
    async fn clear(&self) -> ScoreResult<()>;
}

/// Insert keeping the history sorted by descending score (stable for ties)
fn insert_ranked(entries: &mut Vec<ScoreEntry>, entry: ScoreEntry) {
    let position = entries.partition_point(|e| e.score >= entry.score);
    entries.insert(position, entry);
}

#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    entries: RwLock<Vec<ScoreEntry>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn append(&self, entry: ScoreEntry) -> ScoreResult<()> {
        insert_ranked(&mut *self.entries.write().await, entry);
        Ok(())
    }

    async fn list(&self) -> ScoreResult<Vec<ScoreEntry>> {
        Ok(self.entries.read().await.clone())
    }

    async fn clear(&self) -> ScoreResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Score history kept in a single JSON file.
///
/// Every write replaces the file through a temp file and rename.
pub struct JsonFileScoreStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileScoreStore {
    pub async fn open(path: impl Into<PathBuf>) -> ScoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tracing::info!("Score history at {}", path.display());
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    async fn read_entries(&self) -> ScoreResult<Vec<ScoreEntry>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entries(&self, entries: &[ScoreEntry]) -> ScoreResult<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for JsonFileScoreStore {
    async fn append(&self, entry: ScoreEntry) -> ScoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        insert_ranked(&mut entries, entry);
        self.write_entries(&entries).await
    }

    async fn list(&self) -> ScoreResult<Vec<ScoreEntry>> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        // Files edited by hand may be out of order
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(entries)
    }

    async fn clear(&self) -> ScoreResult<()> {
        let _guard = self.lock.lock().await;
        self.write_entries(&[]).await
    }
}

/// Render the history as CSV for spreadsheet download.
///
/// Starts with a UTF-8 BOM so spreadsheet apps pick the right encoding.
pub fn scores_csv(entries: &[ScoreEntry]) -> String {
    let mut csv = String::from("\u{FEFF}Ranking,Name,Score,Date");
    for (index, entry) in entries.iter().enumerate() {
        csv.push('\n');
        csv.push_str(&format!(
            "{},{},{},{}",
            index + 1,
            quote(&entry.name),
            entry.score,
            quote(&entry.timestamp)
        ));
    }
    csv
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
