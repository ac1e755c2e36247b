use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Opaque ID types for type safety
pub type QuestionId = String;
pub type GameId = String;

/// Every playable question offers exactly this many options
pub const OPTION_COUNT: usize = 4;

/// Name recorded when a player finishes without entering one
pub const ANONYMOUS_PLAYER: &str = "Anonymous";

/// A raw question as stored in the bank or returned by a source.
///
/// The wire shape matches the JSON the frontend and the LLM prompt use
/// (`question`, `options`, `correct`, `category`), with aliases for the
/// spelled-out field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuestionId>,
    #[serde(rename = "question", alias = "text")]
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "correct", alias = "correctIndex", alias = "correct_index")]
    pub correct_index: usize,
    #[serde(default)]
    pub category: String,
    /// Ignored on input: the preparer assigns prizes by position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prize: Option<u64>,
    #[serde(
        default,
        rename = "createdAt",
        alias = "created_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
}

/// Reasons a record is not playable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordDefect {
    #[error("question text is blank")]
    BlankText,

    #[error("expected 4 options, got {0}")]
    OptionCount(usize),

    #[error("option {0} is blank")]
    BlankOption(usize),

    #[error("option {0} duplicates an earlier option")]
    DuplicateOption(usize),

    #[error("correct index {0} is out of range")]
    CorrectIndexOutOfRange(usize),
}

impl QuestionRecord {
    pub fn new(
        text: impl Into<String>,
        options: [&str; OPTION_COUNT],
        correct_index: usize,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            text: text.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_index,
            category: category.into(),
            prize: None,
            created_at: None,
        }
    }

    /// Check the record is playable: non-blank text, four distinct
    /// non-blank options and a correct index pointing into them.
    pub fn validate(&self) -> Result<(), RecordDefect> {
        if self.text.trim().is_empty() {
            return Err(RecordDefect::BlankText);
        }
        if self.options.len() != OPTION_COUNT {
            return Err(RecordDefect::OptionCount(self.options.len()));
        }

        let mut seen = HashSet::with_capacity(OPTION_COUNT);
        for (index, option) in self.options.iter().enumerate() {
            let trimmed = option.trim();
            if trimmed.is_empty() {
                return Err(RecordDefect::BlankOption(index));
            }
            if !seen.insert(trimmed) {
                return Err(RecordDefect::DuplicateOption(index));
            }
        }

        if self.correct_index >= OPTION_COUNT {
            return Err(RecordDefect::CorrectIndexOutOfRange(self.correct_index));
        }
        Ok(())
    }

    pub fn is_playable(&self) -> bool {
        self.validate().is_ok()
    }
}

/// A question selected for a round, carrying the prize for its position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuestionId>,
    #[serde(rename = "question")]
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "correct")]
    pub correct_index: usize,
    pub category: String,
    pub prize: u64,
}

impl PreparedQuestion {
    pub fn from_record(record: &QuestionRecord, prize: u64) -> Self {
        Self {
            id: record.id.clone(),
            text: record.text.clone(),
            options: record.options.clone(),
            correct_index: record.correct_index,
            category: record.category.clone(),
            prize,
        }
    }
}

/// What a player sees while a question is live (no correct index)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub position: usize,
    pub question: String,
    pub options: Vec<String>,
    pub category: String,
    pub prize: u64,
}

impl QuestionView {
    pub fn new(position: usize, question: &PreparedQuestion) -> Self {
        Self {
            position,
            question: question.text.clone(),
            options: question.options.clone(),
            category: question.category.clone(),
            prize: question.prize,
        }
    }
}

/// One finished game in the score history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub score: u64,
    /// ISO8601 timestamp of when the game ended
    #[serde(alias = "date")]
    pub timestamp: String,
}

impl ScoreEntry {
    /// Create an entry stamped with the current time
    pub fn now(name: &str, score: u64) -> Self {
        let trimmed = name.trim();
        Self {
            name: if trimmed.is_empty() {
                ANONYMOUS_PLAYER.to_string()
            } else {
                trimmed.to_string()
            },
            score,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Time allowed per question
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn time_limit(self) -> Duration {
        match self {
            Difficulty::Easy => Duration::from_secs(45),
            Difficulty::Normal => Duration::from_secs(30),
            Difficulty::Hard => Duration::from_secs(15),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSettings {
    /// Whether the phone-a-friend lifeline can be used
    pub lifeline_enabled: bool,
    pub difficulty: Difficulty,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            lifeline_enabled: true,
            difficulty: Difficulty::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QuestionRecord {
        QuestionRecord::new(
            "What does SQL stand for?",
            [
                "Structured Query Language",
                "Simple Query Language",
                "Sequential Query Logic",
                "Standard Question Language",
            ],
            0,
            "Databases",
        )
    }

    #[test]
    fn test_valid_record() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let mut record = sample();
        record.text = "   ".to_string();
        assert_eq!(record.validate(), Err(RecordDefect::BlankText));
    }

    #[test]
    fn test_option_shape_is_checked() {
        let mut record = sample();
        record.options.pop();
        assert_eq!(record.validate(), Err(RecordDefect::OptionCount(3)));

        let mut record = sample();
        record.options[2] = " Structured Query Language ".to_string();
        assert_eq!(record.validate(), Err(RecordDefect::DuplicateOption(2)));

        let mut record = sample();
        record.options[1] = "".to_string();
        assert_eq!(record.validate(), Err(RecordDefect::BlankOption(1)));

        let mut record = sample();
        record.correct_index = 4;
        assert_eq!(
            record.validate(),
            Err(RecordDefect::CorrectIndexOutOfRange(4))
        );
    }

    #[test]
    fn test_record_wire_format() {
        let json = r#"{
            "question": "What is 2+2?",
            "options": ["3", "4", "5", "6"],
            "correct": 1,
            "prize": 100,
            "category": "Math"
        }"#;
        let record: QuestionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.text, "What is 2+2?");
        assert_eq!(record.correct_index, 1);
        assert_eq!(record.prize, Some(100));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["question"], "What is 2+2?");
        assert_eq!(value["correct"], 1);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_record_accepts_spelled_out_aliases() {
        let json = r#"{
            "text": "Capital of France?",
            "options": ["Paris", "Rome", "Madrid", "Berlin"],
            "correctIndex": 0
        }"#;
        let record: QuestionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.text, "Capital of France?");
        assert_eq!(record.category, "");
        assert!(record.is_playable());
    }

    #[test]
    fn test_record_survives_roundtrip_except_prize() {
        let mut record = sample();
        record.id = Some("q1".to_string());
        record.created_at = Some("2025-01-01T00:00:00Z".to_string());
        record.prize = Some(5000);

        let json = serde_json::to_string(&record).unwrap();
        let mut parsed: QuestionRecord = serde_json::from_str(&json).unwrap();
        parsed.prize = None;
        record.prize = None;
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_score_entry_defaults_blank_name() {
        let entry = ScoreEntry::now("  ", 500);
        assert_eq!(entry.name, ANONYMOUS_PLAYER);
        assert_eq!(entry.score, 500);
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
    }

    #[test]
    fn test_difficulty_time_limits() {
        assert_eq!(Difficulty::Easy.time_limit(), Duration::from_secs(45));
        assert_eq!(Difficulty::Normal.time_limit(), Duration::from_secs(30));
        assert_eq!(Difficulty::Hard.time_limit(), Duration::from_secs(15));
        assert_eq!("HARD".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert!("extreme".parse::<Difficulty>().is_err());
    }
}
