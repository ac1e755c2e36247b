//! The fixed prize ladder a round climbs.
//!
//! A ladder is built once (from the standard values or from configuration)
//! and never changes afterwards.

use serde::Serialize;
use std::str::FromStr;

/// Number of rungs on the ladder, and the maximum questions in a round
pub const LADDER_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LadderError {
    #[error("prize ladder needs exactly {expected} steps, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("prize ladder must be strictly increasing (step {index}: {value} after {previous})")]
    NotIncreasing {
        index: usize,
        previous: u64,
        value: u64,
    },

    #[error("invalid prize value '{0}'")]
    InvalidValue(String),
}

/// Ten strictly increasing prize values, one per question position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PrizeLadder([u64; LADDER_LEN]);

impl PrizeLadder {
    pub const STANDARD: PrizeLadder = PrizeLadder([
        100, 500, 1_000, 5_000, 15_000, 50_000, 100_000, 250_000, 500_000, 1_000_000,
    ]);

    pub fn new(steps: [u64; LADDER_LEN]) -> Result<Self, LadderError> {
        for index in 1..LADDER_LEN {
            if steps[index] <= steps[index - 1] {
                return Err(LadderError::NotIncreasing {
                    index,
                    previous: steps[index - 1],
                    value: steps[index],
                });
            }
        }
        Ok(Self(steps))
    }

    pub fn from_slice(steps: &[u64]) -> Result<Self, LadderError> {
        let steps: [u64; LADDER_LEN] =
            steps.try_into().map_err(|_| LadderError::WrongLength {
                expected: LADDER_LEN,
                actual: steps.len(),
            })?;
        Self::new(steps)
    }

    /// Prize for the question at `position` (zero-based), if the ladder reaches it
    pub fn prize_at(&self, position: usize) -> Option<u64> {
        self.0.get(position).copied()
    }

    pub fn steps(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        LADDER_LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn top_prize(&self) -> u64 {
        self.0[LADDER_LEN - 1]
    }
}

impl Default for PrizeLadder {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Parses a comma-separated list such as `100,500,1000,...`
impl FromStr for PrizeLadder {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.replace('_', "")
                    .parse::<u64>()
                    .map_err(|_| LadderError::InvalidValue(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_slice(&values)
    }
}
