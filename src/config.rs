//! Server configuration loaded from `MILLIONAIRE_*` environment variables.

use crate::ladder::{LadderError, PrizeLadder};
use crate::prepare::DEFAULT_PLACEHOLDER_MARKERS;
use crate::session::ShortPoolPolicy;
use crate::types::{Difficulty, GameSettings};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("MILLIONAIRE_PRIZE_LADDER: {0}")]
    Ladder(#[from] LadderError),
}

fn invalid(key: &'static str, message: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub scores_file: PathBuf,
    pub static_dir: PathBuf,
    /// Remote question endpoint used instead of the local bank
    pub remote_source: Option<String>,
    /// Zero disables source caching
    pub source_cache_ttl: Duration,
    pub prize_ladder: PrizeLadder,
    pub placeholder_markers: Vec<String>,
    pub short_pool_policy: ShortPoolPolicy,
    pub game_settings: GameSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            data_dir: PathBuf::from("data/questions"),
            scores_file: PathBuf::from("data/scores.json"),
            static_dir: PathBuf::from("static"),
            remote_source: None,
            source_cache_ttl: Duration::from_secs(60),
            prize_ladder: PrizeLadder::STANDARD,
            placeholder_markers: DEFAULT_PLACEHOLDER_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            short_pool_policy: ShortPoolPolicy::Refuse,
            game_settings: GameSettings::default(),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AppConfig {
    /// Load configuration, falling back to defaults for unset variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(bind) = env_value("MILLIONAIRE_BIND") {
            config.bind = bind
                .parse()
                .map_err(|e| invalid("MILLIONAIRE_BIND", e))?;
        }
        if let Some(dir) = env_value("MILLIONAIRE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = env_value("MILLIONAIRE_SCORES_FILE") {
            config.scores_file = PathBuf::from(file);
        }
        if let Some(dir) = env_value("MILLIONAIRE_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        config.remote_source = env_value("MILLIONAIRE_REMOTE_SOURCE");

        if let Some(secs) = env_value("MILLIONAIRE_SOURCE_CACHE_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| invalid("MILLIONAIRE_SOURCE_CACHE_SECS", e))?;
            config.source_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(ladder) = env_value("MILLIONAIRE_PRIZE_LADDER") {
            config.prize_ladder = ladder.parse()?;
        }
        if let Some(markers) = env_value("MILLIONAIRE_PLACEHOLDER_MARKERS") {
            config.placeholder_markers = markers
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(policy) = env_value("MILLIONAIRE_SHORT_POOL") {
            config.short_pool_policy = policy
                .parse()
                .map_err(|e| invalid("MILLIONAIRE_SHORT_POOL", e))?;
        }
        if let Some(difficulty) = env_value("MILLIONAIRE_DIFFICULTY") {
            config.game_settings.difficulty = difficulty
                .parse::<Difficulty>()
                .map_err(|e| invalid("MILLIONAIRE_DIFFICULTY", e))?;
        }
        if let Some(lifeline) = env_value("MILLIONAIRE_LIFELINE") {
            config.game_settings.lifeline_enabled = parse_flag(&lifeline)
                .ok_or_else(|| invalid("MILLIONAIRE_LIFELINE", "expected true or false"))?;
        }

        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
