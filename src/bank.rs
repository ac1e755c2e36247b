//! File-backed question bank.
//!
//! Each saved batch is one pretty-printed JSON array in the bank directory.
//! The bank is also a [`QuestionSource`]: its pool is every saved file
//! merged together.

use crate::source::{parse_pool, LoadedPool, QuestionSource, SourceError, SourceResult};
use crate::types::QuestionRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub type BankResult<T> = Result<T, BankError>;

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid file name '{0}'")]
    InvalidFilename(String),

    #[error("batch contains no valid questions")]
    EmptyBatch,
}

/// Result of saving one batch
#[derive(Debug, Clone, Serialize)]
pub struct SavedBatch {
    pub filename: String,
    pub saved: usize,
    /// Records dropped because they failed validation
    pub rejected: usize,
}

/// A batch file in the bank directory
#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub name: String,
    pub size: u64,
    /// RFC3339 modification time, when the filesystem reports one
    pub modified: Option<String>,
}

pub struct QuestionBank {
    dir: PathBuf,
}

impl QuestionBank {
    /// Open (and create if needed) a bank rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> BankResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!("Question bank at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and store a batch of questions.
    ///
    /// Invalid records are dropped. Missing ids and creation times are
    /// filled in and any incoming prize is cleared.
    pub async fn save_batch(
        &self,
        records: Vec<QuestionRecord>,
        filename: Option<&str>,
    ) -> BankResult<SavedBatch> {
        let filename = match filename {
            Some(name) => sanitize_filename(name)?,
            None => format!("questions_{}.json", ulid::Ulid::new().to_string().to_lowercase()),
        };

        let total = records.len();
        let now = chrono::Utc::now().to_rfc3339();
        let accepted: Vec<QuestionRecord> = records
            .into_iter()
            .filter(|record| match record.validate() {
                Ok(()) => true,
                Err(defect) => {
                    tracing::debug!("Rejecting question '{}': {}", record.text, defect);
                    false
                }
            })
            .map(|mut record| {
                record.id.get_or_insert_with(|| ulid::Ulid::new().to_string());
                record.created_at.get_or_insert_with(|| now.clone());
                record.prize = None;
                record
            })
            .collect();

        if accepted.is_empty() {
            return Err(BankError::EmptyBatch);
        }

        let json = serde_json::to_vec_pretty(&accepted)?;
        let path = self.dir.join(&filename);
        let tmp = self.dir.join(format!(".{}.tmp", filename));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        let saved = SavedBatch {
            filename,
            saved: accepted.len(),
            rejected: total - accepted.len(),
        };
        tracing::info!(
            "Saved {} questions to {} ({} rejected)",
            saved.saved,
            saved.filename,
            saved.rejected
        );
        Ok(saved)
    }

    /// List saved batch files, newest first
    pub async fn list_files(&self) -> BankResult<Vec<SavedFile>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_batch_file(&path) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let modified = metadata
                .modified()
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

            files.push(SavedFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified,
            });
        }

        // RFC3339 strings in UTC sort chronologically
        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(files)
    }

    /// Merge every saved batch into one pool.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub async fn load_all(&self) -> BankResult<LoadedPool> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_batch_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut pool = LoadedPool::default();
        for path in paths {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Skipping unreadable bank file {}: {}", path.display(), e);
                    continue;
                }
            };
            match parse_pool(&bytes) {
                Ok(loaded) => pool.extend(loaded),
                Err(e) => {
                    tracing::warn!("Skipping invalid bank file {}: {}", path.display(), e);
                }
            }
        }

        tracing::debug!(
            "Loaded {} questions from bank ({} malformed)",
            pool.records.len(),
            pool.malformed
        );
        Ok(pool)
    }
}

#[async_trait]
impl QuestionSource for QuestionBank {
    async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>> {
        self.load_all()
            .await
            .map(|pool| pool.records)
            .map_err(|e| SourceError::Unavailable(e.to_string()))
    }

    fn name(&self) -> &str {
        "bank"
    }
}

fn is_batch_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    !hidden && path.extension().and_then(|e| e.to_str()) == Some("json")
}

/// Restrict a client-supplied name to a plain `.json` file in the bank
fn sanitize_filename(name: &str) -> BankResult<String> {
    let trimmed = name.trim();
    let valid = !trimmed.is_empty()
        && !trimmed.starts_with('.')
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(BankError::InvalidFilename(name.to_string()));
    }

    if trimmed.ends_with(".json") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}.json", trimmed))
    }
}
