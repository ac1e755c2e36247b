//! Round preparation: turns a raw question pool into the ordered,
//! prize-annotated questions of one game.
//!
//! The pipeline is validate -> placeholder filter -> exclusion filter ->
//! dedup -> Fisher-Yates shuffle -> take ladder length -> assign prizes.
//! It performs no I/O and never mutates the pool.

use crate::ladder::PrizeLadder;
use crate::types::{PreparedQuestion, QuestionRecord};
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

/// Markers identifying seed/test records that must never reach a player
pub const DEFAULT_PLACEHOLDER_MARKERS: &[&str] = &["inicialización", "initialization"];

/// Dedup key for a question text: trimmed and lower-cased
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Shuffle `items` in place with Fisher-Yates.
///
/// `draw(i)` must return an index uniformly chosen from `0..=i`; it is
/// called for `i` from `len - 1` down to `1`.
///
/// # Panics
///
/// If `draw(i)` returns an index greater than `i`.
pub fn fisher_yates<T, F>(items: &mut [T], mut draw: F)
where
    F: FnMut(usize) -> usize,
{
    for i in (1..items.len()).rev() {
        let j = draw(i);
        assert!(j <= i, "draw({}) returned out-of-range index {}", i, j);
        items.swap(i, j);
    }
}

/// Counts of what the pipeline dropped, for logging and callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrepareStats {
    pub pool_size: usize,
    pub malformed: usize,
    pub placeholders: usize,
    pub excluded: usize,
    pub duplicates: usize,
    /// Unique playable questions left before selection
    pub available: usize,
}

/// The questions selected for one round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedRound {
    pub questions: Vec<PreparedQuestion>,
    pub stats: PrepareStats,
    /// Number of questions a full round has
    pub full_length: usize,
}

impl PreparedRound {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// True when the pool could not fill every rung of the ladder
    pub fn is_short(&self) -> bool {
        self.questions.len() < self.full_length
    }

    pub fn into_questions(self) -> Vec<PreparedQuestion> {
        self.questions
    }
}

/// Builds rounds from question pools against a fixed prize ladder
#[derive(Debug, Clone)]
pub struct QuestionBankPreparer {
    ladder: PrizeLadder,
    /// Lower-cased placeholder markers
    markers: Vec<String>,
}

impl Default for QuestionBankPreparer {
    fn default() -> Self {
        Self::new(PrizeLadder::STANDARD)
    }
}

impl QuestionBankPreparer {
    pub fn new(ladder: PrizeLadder) -> Self {
        Self {
            ladder,
            markers: DEFAULT_PLACEHOLDER_MARKERS
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    /// Replace the placeholder markers; blank markers are ignored
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.markers = markers
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        self
    }

    pub fn ladder(&self) -> &PrizeLadder {
        &self.ladder
    }

    /// Whether an already normalized text carries a placeholder marker
    fn is_placeholder(&self, normalized: &str) -> bool {
        self.markers.iter().any(|m| normalized.contains(m.as_str()))
    }

    /// Prepare a round using the thread-local RNG
    pub fn prepare(&self, pool: &[QuestionRecord], exclude: &HashSet<String>) -> PreparedRound {
        self.prepare_with_rng(pool, exclude, &mut rand::rng())
    }

    /// Prepare a round drawing shuffle indices from `rng`
    pub fn prepare_with_rng<R>(
        &self,
        pool: &[QuestionRecord],
        exclude: &HashSet<String>,
        rng: &mut R,
    ) -> PreparedRound
    where
        R: Rng,
    {
        self.prepare_with(pool, exclude, |upper| rng.random_range(0..=upper))
    }

    /// Prepare a round with an explicit shuffle draw.
    ///
    /// Panics if `draw` breaks the [`fisher_yates`] contract.
    pub fn prepare_with<F>(
        &self,
        pool: &[QuestionRecord],
        exclude: &HashSet<String>,
        draw: F,
    ) -> PreparedRound
    where
        F: FnMut(usize) -> usize,
    {
        let excluded: HashSet<String> = exclude.iter().map(|t| normalize_text(t)).collect();
        let mut stats = PrepareStats {
            pool_size: pool.len(),
            ..Default::default()
        };

        let mut seen = HashSet::with_capacity(pool.len());
        let mut candidates: Vec<&QuestionRecord> = Vec::with_capacity(pool.len());

        for record in pool {
            if record.validate().is_err() {
                stats.malformed += 1;
                continue;
            }
            let key = normalize_text(&record.text);
            if self.is_placeholder(&key) {
                stats.placeholders += 1;
                continue;
            }
            if excluded.contains(&key) {
                stats.excluded += 1;
                continue;
            }
            if !seen.insert(key) {
                stats.duplicates += 1;
                continue;
            }
            candidates.push(record);
        }
        stats.available = candidates.len();

        fisher_yates(&mut candidates, draw);

        let questions: Vec<PreparedQuestion> = candidates
            .into_iter()
            .zip(self.ladder.steps())
            .map(|(record, &prize)| PreparedQuestion::from_record(record, prize))
            .collect();

        tracing::debug!(
            "Prepared {} questions from pool of {} (malformed: {}, placeholders: {}, excluded: {}, duplicates: {})",
            questions.len(),
            stats.pool_size,
            stats.malformed,
            stats.placeholders,
            stats.excluded,
            stats.duplicates
        );

        let round = PreparedRound {
            questions,
            stats,
            full_length: self.ladder.len(),
        };
        if round.is_short() {
            tracing::warn!(
                "Only {} playable questions available, a full round needs {}",
                round.len(),
                round.full_length
            );
        }
        round
    }
}
