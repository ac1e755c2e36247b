use super::AppState;
use crate::prepare::PreparedRound;
use crate::session::{AnswerOutcome, GameError, GameSession, LifelineHint, SessionView};
use crate::source::load_pool;
use crate::types::ScoreEntry;
use std::collections::HashSet;
use std::time::{Duration, Instant};

impl AppState {
    /// Prepare a round from the configured source
    pub async fn prepare_round(&self, exclude: &HashSet<String>) -> PreparedRound {
        let pool = load_pool(self.source.as_ref()).await;
        self.preparer.prepare(&pool, exclude)
    }

    /// Start a game for `player`.
    ///
    /// Without an explicit exclusion list the previous round's questions are
    /// kept out of this one, unless that would leave a shorter round than
    /// the pool can give.
    pub async fn start_game(
        &self,
        player: &str,
        exclude: Option<Vec<String>>,
    ) -> Result<SessionView, GameError> {
        let pool = load_pool(self.source.as_ref()).await;
        let round = match exclude {
            Some(texts) => self
                .preparer
                .prepare(&pool, &texts.into_iter().collect::<HashSet<String>>()),
            None => {
                let previous = self.previous_round.read().await.clone();
                let round = self.preparer.prepare(&pool, &previous);
                if round.is_short() && !previous.is_empty() {
                    let fresh = self.preparer.prepare(&pool, &HashSet::new());
                    if fresh.len() > round.len() {
                        tracing::debug!(
                            "Pool too small to skip the previous round ({} left), repeating questions",
                            round.len()
                        );
                        fresh
                    } else {
                        round
                    }
                } else {
                    round
                }
            }
        };

        let session = GameSession::start(
            player,
            round,
            self.config.short_pool_policy,
            self.config.game_settings,
        )?;

        *self.previous_round.write().await = session
            .questions()
            .iter()
            .map(|q| q.text.clone())
            .collect();

        let view = session.view();
        self.purge_sessions(Instant::now()).await;
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session);
        Ok(view)
    }

    /// Drop finished sessions and the ones abandoned mid-game
    pub(crate) async fn purge_sessions(&self, now: Instant) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_finished() && !s.is_abandoned(now));
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::debug!("Purged {} finished or abandoned sessions", purged);
        }
    }

    pub async fn get_session(&self, id: &str) -> Result<SessionView, GameError> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(GameSession::view)
            .ok_or_else(|| GameError::NotFound(id.to_string()))
    }

    /// Answer the live question. The time taken is measured on the server;
    /// `reported` is the client's measurement and can only add to it.
    pub async fn answer(
        &self,
        id: &str,
        choice: usize,
        reported: Duration,
    ) -> Result<(AnswerOutcome, SessionView), GameError> {
        self.answer_at(id, choice, reported, Instant::now()).await
    }

    pub(crate) async fn answer_at(
        &self,
        id: &str,
        choice: usize,
        reported: Duration,
        now: Instant,
    ) -> Result<(AnswerOutcome, SessionView), GameError> {
        self.play(id, |session| session.answer_at(choice, reported, now))
            .await
    }

    pub async fn time_out(&self, id: &str) -> Result<(AnswerOutcome, SessionView), GameError> {
        self.play(id, GameSession::time_out).await
    }

    pub async fn phone_a_friend(&self, id: &str) -> Result<LifelineHint, GameError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| GameError::NotFound(id.to_string()))?;
        session.phone_a_friend(&mut rand::rng())
    }

    /// Apply a move to a session and record the score if it ended the game
    async fn play<F>(&self, id: &str, action: F) -> Result<(AnswerOutcome, SessionView), GameError>
    where
        F: FnOnce(&mut GameSession) -> Result<AnswerOutcome, GameError>,
    {
        let (outcome, view, entry) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| GameError::NotFound(id.to_string()))?;
            let outcome = action(session)?;
            let entry = if outcome.is_final() {
                session.score_entry()
            } else {
                None
            };
            (outcome, session.view(), entry)
        };

        if let Some(entry) = entry {
            self.record_score(entry).await;
        }
        Ok((outcome, view))
    }

    async fn record_score(&self, entry: ScoreEntry) {
        let (name, score) = (entry.name.clone(), entry.score);
        match self.scores.append(entry).await {
            Ok(()) => tracing::info!("Recorded score {} for {}", score, name),
            Err(e) => tracing::error!("Failed to record score for {}: {}", name, e),
        }
    }
}
