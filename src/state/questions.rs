use super::AppState;
use crate::bank::{BankError, SavedBatch};
use crate::llm::{LlmError, QuestionRequest};
use crate::types::QuestionRecord;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("question generation is not configured")]
    Unavailable,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Bank(#[from] BankError),
}

impl AppState {
    /// Store a batch in the bank
    pub async fn save_questions(
        &self,
        records: Vec<QuestionRecord>,
        filename: Option<&str>,
    ) -> Result<SavedBatch, BankError> {
        let saved = self.bank.save_batch(records, filename).await?;
        self.invalidate_source().await;
        Ok(saved)
    }

    /// Generate a batch with the configured LLM providers and save it.
    ///
    /// The previous round's questions are added to the avoid list.
    pub async fn generate_questions(
        &self,
        mut request: QuestionRequest,
        model_id: Option<&str>,
        filename: Option<&str>,
    ) -> Result<SavedBatch, GenerateError> {
        let llm = self.llm.as_ref().ok_or(GenerateError::Unavailable)?;

        request
            .avoid
            .extend(self.previous_round.read().await.iter().cloned());

        tracing::info!(
            "Generating {} questions{}",
            request.count,
            model_id.map(|m| format!(" with {}", m)).unwrap_or_default()
        );
        let records = llm
            .generate_questions(&request, &self.llm_config, model_id)
            .await?;

        Ok(self.save_questions(records, filename).await?)
    }
}
