//! Plays one prepared round: a player climbs the ladder question by question
//! until they answer wrong, run out of time, or answer the last one.

use crate::prepare::PreparedRound;
use crate::types::{
    GameId, GameSettings, PreparedQuestion, QuestionView, ScoreEntry, ANONYMOUS_PLAYER,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Chance the friend on the phone names the right answer
pub const FRIEND_ACCURACY: f64 = 0.8;

/// Allowance for network latency when the server measures answer time
pub const ANSWER_GRACE: Duration = Duration::from_secs(2);

/// An in-progress session idle for this many question time limits is abandoned
const ABANDONED_AFTER_LIMITS: u32 = 4;

/// What to do when the pool cannot fill a whole ladder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortPoolPolicy {
    /// Refuse to start the game
    #[default]
    Refuse,
    /// Play the questions that are available, using the lowest rungs
    PlayShort,
}

impl FromStr for ShortPoolPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "refuse" => Ok(ShortPoolPolicy::Refuse),
            "play-short" => Ok(ShortPoolPolicy::PlayShort),
            other => Err(format!("unknown short pool policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("no playable questions available")]
    NoQuestions,

    #[error("only {available} playable questions available, {required} required")]
    InsufficientPool { available: usize, required: usize },

    #[error("choice {0} is not one of the options")]
    InvalidChoice(usize),

    #[error("game is already finished")]
    Finished,

    #[error("lifeline is not available")]
    LifelineUnavailable,

    #[error("game '{0}' not found")]
    NotFound(GameId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Won,
    Lost,
    TimedOut,
}

impl SessionStatus {
    pub fn is_finished(self) -> bool {
        self != SessionStatus::InProgress
    }
}

/// Result of answering (or failing to answer) the live question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AnswerOutcome {
    Correct { prize: u64, next_position: usize },
    Won { final_score: u64 },
    Wrong { correct_index: usize, final_score: u64 },
    TimedOut { correct_index: usize, final_score: u64 },
}

impl AnswerOutcome {
    /// Whether this outcome ended the game
    pub fn is_final(&self) -> bool {
        !matches!(self, AnswerOutcome::Correct { .. })
    }
}

/// The friend's suggestion from the phone-a-friend lifeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifelineHint {
    pub suggestion: usize,
    pub option: String,
}

/// Client-facing state of a session; never includes the live answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: GameId,
    pub player: String,
    pub status: SessionStatus,
    pub position: usize,
    pub total_questions: usize,
    pub banked: u64,
    pub current: Option<QuestionView>,
    pub lifeline_available: bool,
    pub time_limit_secs: u64,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    id: GameId,
    player: String,
    questions: Vec<PreparedQuestion>,
    position: usize,
    /// Prize of the last correctly answered question
    banked: u64,
    status: SessionStatus,
    settings: GameSettings,
    lifeline_used: bool,
    started_at: String,
    finished_at: Option<String>,
    /// When the live question was shown
    question_shown: Instant,
    last_activity: Instant,
}

impl GameSession {
    pub fn start(
        player: &str,
        round: PreparedRound,
        policy: ShortPoolPolicy,
        settings: GameSettings,
    ) -> Result<Self, GameError> {
        if round.is_empty() {
            return Err(GameError::NoQuestions);
        }
        if round.is_short() && policy == ShortPoolPolicy::Refuse {
            return Err(GameError::InsufficientPool {
                available: round.len(),
                required: round.full_length,
            });
        }

        let player = player.trim();
        let now = Instant::now();
        let session = Self {
            id: ulid::Ulid::new().to_string(),
            player: if player.is_empty() {
                ANONYMOUS_PLAYER.to_string()
            } else {
                player.to_string()
            },
            questions: round.into_questions(),
            position: 0,
            banked: 0,
            status: SessionStatus::InProgress,
            settings,
            lifeline_used: false,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            question_shown: now,
            last_activity: now,
        };

        tracing::info!(
            "Game {} started for {} with {} questions",
            session.id,
            session.player,
            session.questions.len()
        );
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn questions(&self) -> &[PreparedQuestion] {
        &self.questions
    }

    pub fn time_limit(&self) -> Duration {
        self.settings.difficulty.time_limit()
    }

    /// The question the player is facing, while the game is running
    pub fn current_question(&self) -> Option<&PreparedQuestion> {
        if self.is_finished() {
            return None;
        }
        self.questions.get(self.position)
    }

    /// Score if the game ended now
    pub fn final_score(&self) -> u64 {
        self.banked
    }

    pub fn lifeline_available(&self) -> bool {
        self.settings.lifeline_enabled && !self.lifeline_used && !self.is_finished()
    }

    /// Time the live question has been on screen at `now`
    pub fn question_elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.question_shown)
    }

    /// Whether the game is still running but nobody has touched it for
    /// several question time limits
    pub fn is_abandoned(&self, now: Instant) -> bool {
        !self.is_finished()
            && now.saturating_duration_since(self.last_activity)
                > self.time_limit() * ABANDONED_AFTER_LIMITS
    }

    /// Answer the live question with option `choice` after `elapsed`
    pub fn answer(&mut self, choice: usize, elapsed: Duration) -> Result<AnswerOutcome, GameError> {
        self.resolve(choice, elapsed, Instant::now())
    }

    /// Answer the live question at `now`, timing it with the server clock.
    ///
    /// `reported` is the client's own measurement. It can only make the
    /// answer later, never earlier than the server saw it, less
    /// [`ANSWER_GRACE`].
    pub fn answer_at(
        &mut self,
        choice: usize,
        reported: Duration,
        now: Instant,
    ) -> Result<AnswerOutcome, GameError> {
        let measured = self.question_elapsed(now).saturating_sub(ANSWER_GRACE);
        self.resolve(choice, measured.max(reported), now)
    }

    fn resolve(
        &mut self,
        choice: usize,
        elapsed: Duration,
        now: Instant,
    ) -> Result<AnswerOutcome, GameError> {
        let question = self.current_question().ok_or(GameError::Finished)?;
        if choice >= question.options.len() {
            return Err(GameError::InvalidChoice(choice));
        }
        let correct_index = question.correct_index;
        let prize = question.prize;
        self.last_activity = now;

        if elapsed > self.time_limit() {
            return self.time_out();
        }

        if choice != correct_index {
            self.finish(SessionStatus::Lost);
            return Ok(AnswerOutcome::Wrong {
                correct_index,
                final_score: self.banked,
            });
        }

        self.banked = prize;
        self.position += 1;
        self.question_shown = now;
        if self.position == self.questions.len() {
            self.finish(SessionStatus::Won);
            return Ok(AnswerOutcome::Won {
                final_score: self.banked,
            });
        }

        Ok(AnswerOutcome::Correct {
            prize,
            next_position: self.position,
        })
    }

    /// The clock ran out on the live question
    pub fn time_out(&mut self) -> Result<AnswerOutcome, GameError> {
        let correct_index = self
            .current_question()
            .ok_or(GameError::Finished)?
            .correct_index;
        self.finish(SessionStatus::TimedOut);
        Ok(AnswerOutcome::TimedOut {
            correct_index,
            final_score: self.banked,
        })
    }

    /// Ask a friend about the live question; usable once per game
    pub fn phone_a_friend<R: Rng>(&mut self, rng: &mut R) -> Result<LifelineHint, GameError> {
        if self.is_finished() {
            return Err(GameError::Finished);
        }
        if !self.lifeline_available() {
            return Err(GameError::LifelineUnavailable);
        }
        let question = self.current_question().ok_or(GameError::Finished)?;

        let suggestion = if rng.random_bool(FRIEND_ACCURACY) {
            question.correct_index
        } else {
            let wrong: Vec<usize> = (0..question.options.len())
                .filter(|&i| i != question.correct_index)
                .collect();
            wrong[rng.random_range(0..wrong.len())]
        };
        let hint = LifelineHint {
            suggestion,
            option: question.options[suggestion].clone(),
        };

        self.lifeline_used = true;
        self.last_activity = Instant::now();
        tracing::debug!("Game {} used phone-a-friend", self.id);
        Ok(hint)
    }

    /// History entry for a finished game
    pub fn score_entry(&self) -> Option<ScoreEntry> {
        if !self.is_finished() {
            return None;
        }
        Some(ScoreEntry {
            name: self.player.clone(),
            score: self.banked,
            timestamp: self
                .finished_at
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        })
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            player: self.player.clone(),
            status: self.status,
            position: self.position,
            total_questions: self.questions.len(),
            banked: self.banked,
            current: self
                .current_question()
                .map(|q| QuestionView::new(self.position, q)),
            lifeline_available: self.lifeline_available(),
            time_limit_secs: self.time_limit().as_secs(),
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
        }
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
        tracing::info!(
            "Game {} finished: {:?} with {} for {}",
            self.id,
            status,
            self.banked,
            self.player
        );
    }
}
