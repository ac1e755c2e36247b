mod game;
mod questions;

pub use questions::GenerateError;

use crate::bank::{BankError, QuestionBank};
use crate::config::AppConfig;
use crate::llm::{LlmConfig, LlmManager};
use crate::prepare::QuestionBankPreparer;
use crate::scores::{JsonFileScoreStore, ScoreStore, ScoreStoreError};
use crate::session::GameSession;
use crate::source::{CachedSource, HttpSource, QuestionSource};
use crate::types::GameId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Timeout for one fetch from a remote question source
const REMOTE_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("question bank: {0}")]
    Bank(#[from] BankError),

    #[error("score history: {0}")]
    Scores(#[from] ScoreStoreError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub preparer: Arc<QuestionBankPreparer>,
    pub bank: Arc<QuestionBank>,
    /// Where rounds draw their pool from
    pub source: Arc<dyn QuestionSource>,
    /// Set when `source` is cached, so bank writes can invalidate it
    source_cache: Option<Arc<CachedSource>>,
    pub scores: Arc<dyn ScoreStore>,
    pub sessions: Arc<RwLock<HashMap<GameId, GameSession>>>,
    /// Texts of the most recently started round, excluded from the next one
    pub previous_round: Arc<RwLock<HashSet<String>>>,
    pub llm: Option<Arc<LlmManager>>,
    pub llm_config: LlmConfig,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        bank: Arc<QuestionBank>,
        source: Arc<dyn QuestionSource>,
        scores: Arc<dyn ScoreStore>,
    ) -> Self {
        let preparer = QuestionBankPreparer::new(config.prize_ladder)
            .with_markers(&config.placeholder_markers);

        Self {
            config: Arc::new(config),
            preparer: Arc::new(preparer),
            bank,
            source,
            source_cache: None,
            scores,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            previous_round: Arc::new(RwLock::new(HashSet::new())),
            llm: None,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn with_llm(mut self, llm: Option<LlmManager>, llm_config: LlmConfig) -> Self {
        self.llm = llm.map(Arc::new);
        self.llm_config = llm_config;
        self
    }

    /// Wire up the bank, question source and score history from configuration
    pub async fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let bank = Arc::new(QuestionBank::open(&config.data_dir).await?);
        let scores: Arc<dyn ScoreStore> =
            Arc::new(JsonFileScoreStore::open(&config.scores_file).await?);

        let inner: Box<dyn QuestionSource> = match &config.remote_source {
            Some(url) => {
                tracing::info!("Reading questions from {}", url);
                Box::new(HttpSource::new(url.clone(), REMOTE_SOURCE_TIMEOUT))
            }
            None => {
                tracing::info!("Reading questions from the local bank");
                Box::new(bank.clone())
            }
        };

        let ttl = config.source_cache_ttl;
        let mut source_cache = None;
        let source: Arc<dyn QuestionSource> = if ttl.is_zero() {
            Arc::from(inner)
        } else {
            let cached = Arc::new(CachedSource::new(inner, ttl));
            source_cache = Some(cached.clone());
            cached
        };

        let mut state = Self::new(config, bank, source, scores);
        state.source_cache = source_cache;
        Ok(state)
    }

    /// Forget any cached pool after the bank changed
    pub(crate) async fn invalidate_source(&self) {
        if let Some(cache) = &self.source_cache {
            cache.invalidate().await;
        }
    }
}
