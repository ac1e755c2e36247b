//! Question sources: where raw pools come from.
//!
//! Every source hands back unvalidated records; the preparer decides what is
//! playable. Failures never reach the game: [`load_pool`] turns them into an
//! empty pool.

use crate::types::QuestionRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("source returned status {0}")]
    Status(u16),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid question JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unexpected payload: {0}")]
    Shape(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Records parsed from a payload, plus how many elements were unusable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedPool {
    pub records: Vec<QuestionRecord>,
    pub malformed: usize,
}

impl LoadedPool {
    pub fn extend(&mut self, other: LoadedPool) {
        self.records.extend(other.records);
        self.malformed += other.malformed;
    }
}

/// Parse a question payload.
///
/// Accepts a bare array of records or an object with a `questions` array.
/// Elements that do not deserialize as a record are counted and skipped.
pub fn parse_pool(bytes: &[u8]) -> SourceResult<LoadedPool> {
    let value: Value = serde_json::from_slice(bytes)?;
    pool_from_value(value)
}

pub fn pool_from_value(value: Value) -> SourceResult<LoadedPool> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SourceError::Shape(
                    "expected an object with a 'questions' array".to_string(),
                ))
            }
        },
        other => {
            return Err(SourceError::Shape(format!(
                "expected an array of questions, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut pool = LoadedPool::default();
    for item in items {
        match serde_json::from_value::<QuestionRecord>(item) {
            Ok(record) => pool.records.push(record),
            Err(e) => {
                tracing::debug!("Skipping malformed question record: {}", e);
                pool.malformed += 1;
            }
        }
    }
    if pool.malformed > 0 {
        tracing::info!(
            "Dropped {} malformed question records ({} kept)",
            pool.malformed,
            pool.records.len()
        );
    }
    Ok(pool)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Anything that can hand out a raw question pool
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Read the current pool
    async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>>;

    /// Name of this source for logging
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: QuestionSource + ?Sized> QuestionSource for std::sync::Arc<T> {
    async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>> {
        (**self).fetch().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Fetch a pool, degrading any failure to an empty pool
pub async fn load_pool(source: &dyn QuestionSource) -> Vec<QuestionRecord> {
    match source.fetch().await {
        Ok(records) => {
            if records.is_empty() {
                tracing::warn!("Question source '{}' returned no questions", source.name());
            }
            records
        }
        Err(e) => {
            tracing::warn!("Question source '{}' unavailable: {}", source.name(), e);
            Vec::new()
        }
    }
}

/// A fixed in-memory pool
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<QuestionRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<QuestionRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl QuestionSource for StaticSource {
    async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>> {
        Ok(self.records.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Reads a pool from a remote HTTP endpoint returning question JSON
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            url,
            client,
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QuestionSource for HttpSource {
    async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>> {
        let response = tokio::time::timeout(self.timeout, self.client.get(&self.url).send())
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))?
            .map_err(|e| SourceError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        Ok(parse_pool(&bytes)?.records)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Wraps a source and reuses its last good pool for `ttl`.
///
/// When the inner source fails or comes back empty, the last good pool is
/// served even if stale.
pub struct CachedSource {
    inner: Box<dyn QuestionSource>,
    ttl: Duration,
    cache: RwLock<Option<(Instant, Vec<QuestionRecord>)>>,
}

impl CachedSource {
    pub fn new(inner: Box<dyn QuestionSource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached pool so the next fetch goes to the inner source
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

#[async_trait]
impl QuestionSource for CachedSource {
    async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>> {
        if let Some((fetched_at, ref records)) = *self.cache.read().await {
            if fetched_at.elapsed() < self.ttl {
                return Ok(records.clone());
            }
        }

        match self.inner.fetch().await {
            Ok(records) if !records.is_empty() => {
                *self.cache.write().await = Some((Instant::now(), records.clone()));
                Ok(records)
            }
            result => {
                if let Some((_, ref records)) = *self.cache.read().await {
                    match &result {
                        Err(e) => tracing::warn!(
                            "Source '{}' failed ({}), serving cached pool",
                            self.inner.name(),
                            e
                        ),
                        Ok(_) => tracing::warn!(
                            "Source '{}' returned nothing, serving cached pool",
                            self.inner.name()
                        ),
                    }
                    return Ok(records.clone());
                }
                result
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record(text: &str) -> QuestionRecord {
        QuestionRecord::new(text, ["A", "B", "C", "D"], 2, "General")
    }

    /// Source that fails after serving its records once
    struct FlakySource {
        records: Vec<QuestionRecord>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QuestionSource for FlakySource {
        async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(self.records.clone())
            } else {
                Err(SourceError::Unavailable("down".to_string()))
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct FailingSource;

    #[async_trait]
    impl QuestionSource for FailingSource {
        async fn fetch(&self) -> SourceResult<Vec<QuestionRecord>> {
            Err(SourceError::Status(500))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_parse_bare_array() {
        let json = br#"[
            {"question": "Q1", "options": ["a","b","c","d"], "correct": 0, "category": "X"},
            {"question": "Q2", "options": ["a","b","c","d"], "correct": 3}
        ]"#;
        let pool = parse_pool(json).unwrap();
        assert_eq!(pool.records.len(), 2);
        assert_eq!(pool.malformed, 0);
    }

    #[test]
    fn test_parse_wrapped_questions_object() {
        let json = br#"{"questions": [
            {"question": "Q1", "options": ["a","b","c","d"], "correct": 0, "prize": 100}
        ]}"#;
        let pool = parse_pool(json).unwrap();
        assert_eq!(pool.records.len(), 1);
        assert_eq!(pool.records[0].prize, Some(100));
    }

    #[test]
    fn test_parse_counts_malformed_elements() {
        let json = br#"[
            {"options": ["a","b","c","d"], "correct": 0},
            {"question": "Q", "options": ["a","b","c","d"], "correct": -1},
            "not a record",
            {"question": "Fine", "options": ["a","b","c","d"], "correct": 1}
        ]"#;
        let pool = parse_pool(json).unwrap();
        assert_eq!(pool.records.len(), 1);
        assert_eq!(pool.malformed, 3);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(matches!(parse_pool(b"42"), Err(SourceError::Shape(_))));
        assert!(matches!(
            parse_pool(br#"{"items": []}"#),
            Err(SourceError::Shape(_))
        ));
        assert!(matches!(parse_pool(b"not json"), Err(SourceError::Parse(_))));
    }

    #[tokio::test]
    async fn test_load_pool_collapses_failure_to_empty() {
        let pool = load_pool(&FailingSource).await;
        assert!(pool.is_empty());

        let source = StaticSource::new(vec![record("Q1")]);
        assert_eq!(load_pool(&source).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_source_serves_stale_pool_on_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = FlakySource {
            records: vec![record("Q1"), record("Q2")],
            calls: calls.clone(),
        };
        // Zero TTL forces a refetch every time
        let cached = CachedSource::new(Box::new(inner), Duration::ZERO);

        assert_eq!(cached.fetch().await.unwrap().len(), 2);
        assert_eq!(cached.fetch().await.unwrap().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_source_reuses_fresh_pool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = FlakySource {
            records: vec![record("Q1")],
            calls: calls.clone(),
        };
        let cached = CachedSource::new(Box::new(inner), Duration::from_secs(60));

        cached.fetch().await.unwrap();
        cached.fetch().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cached.invalidate().await;
        // Inner source now fails and nothing is cached
        assert!(cached.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_cached_source_propagates_first_failure() {
        let cached = CachedSource::new(Box::new(FailingSource), Duration::from_secs(60));
        assert!(matches!(cached.fetch().await, Err(SourceError::Status(500))));
    }
}
