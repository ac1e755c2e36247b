// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod bank;
pub mod config;
pub mod ladder;
pub mod llm;
pub mod prepare;
pub mod scores;
pub mod session;
pub mod source;
pub mod state;
pub mod types;

pub use ladder::PrizeLadder;
pub use prepare::{PreparedRound, QuestionBankPreparer};
pub use types::{PreparedQuestion, QuestionRecord};
