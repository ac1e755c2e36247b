mod ollama;
mod openai;

use crate::prepare::normalize_text;
use crate::source::parse_pool;
use crate::types::QuestionRecord;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

pub use ollama::{list_local_models, OllamaProvider};
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// A single completion request sent to a provider
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions for the model
    pub system: String,
    /// The prompt text
    pub prompt: String,
    /// Ask the provider to constrain output to a JSON object
    pub json: bool,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
    /// Optional model override (e.g., "gpt-4o" instead of configured model)
    pub model_override: Option<String>,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    /// Provider-specific metadata (model used, tokens consumed, etc.)
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Topics the generator covers when the caller names none
pub const DEFAULT_TOPICS: &[&str] = &[
    "Programming",
    "Software Development",
    "Databases",
    "Computer Networks",
    "Information Security",
    "Operating Systems",
    "Cloud Computing",
    "Software Engineering",
    "Artificial Intelligence",
    "Data Science",
];

const QUESTION_SYSTEM_PROMPT: &str = "You generate multiple-choice trivia questions for a \
    quiz show. Every question has exactly four distinct options and one correct answer. \
    Never repeat questions you were told to avoid. Reply with JSON only.";

/// What to ask the generator for
#[derive(Debug, Clone)]
pub struct QuestionRequest {
    /// Number of questions to ask each provider for
    pub count: usize,
    /// Topics to draw from; empty means [`DEFAULT_TOPICS`]
    pub topics: Vec<String>,
    /// Question texts that must not be produced again
    pub avoid: Vec<String>,
}

impl Default for QuestionRequest {
    fn default() -> Self {
        Self {
            count: crate::ladder::LADDER_LEN,
            topics: Vec::new(),
            avoid: Vec::new(),
        }
    }
}

/// Build the user prompt for a question batch
pub fn build_question_prompt(request: &QuestionRequest) -> String {
    let topics = if request.topics.is_empty() {
        DEFAULT_TOPICS.join(", ")
    } else {
        request.topics.join(", ")
    };

    let mut prompt = format!(
        "Generate {count} introductory-level trivia questions.\n\
         1. TOPICS: basic concepts of {topics}. Do not use the same topic more than twice.\n\
         2. DIFFICULTY: first-semester university level.\n\
         3. FORMAT: return ONLY a JSON object with this structure:\n\
         {{\n  \"questions\": [\n    {{\n      \"question\": \"Question text?\",\n      \
         \"options\": [\"A\", \"B\", \"C\", \"D\"],\n      \"correct\": 0,\n      \
         \"category\": \"Topic name\"\n    }}\n  ]\n}}\n\
         \"correct\" is the zero-based index of the right option.",
        count = request.count,
        topics = topics,
    );

    if !request.avoid.is_empty() {
        prompt.push_str("\n4. AVOID these existing questions:\n");
        for text in &request.avoid {
            prompt.push_str("- ");
            prompt.push_str(text.trim());
            prompt.push('\n');
        }
    }
    prompt
}

/// Parse a model reply into question records.
///
/// Tolerates a surrounding Markdown code fence.
pub fn parse_generated_questions(text: &str) -> LlmResult<Vec<QuestionRecord>> {
    let body = strip_code_fence(text);
    parse_pool(body.as_bytes())
        .map(|pool| pool.records)
        .map_err(|e| LlmError::ParseError(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().trim_end_matches("```").trim()
}

/// Manager for multiple LLM providers
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    /// Create a new LLM manager with the given providers
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Run a request on all providers concurrently.
    /// Returns (provider_name, response) pairs for successful generations
    pub async fn generate_from_all(
        &self,
        request: GenerateRequest,
    ) -> Vec<(String, GenerateResponse)> {
        let tasks = self.providers.iter().map(|provider| {
            let req = request.clone();
            let provider_name = provider.name().to_string();
            let provider_ref = provider.as_ref();

            async move {
                match provider_ref.generate(req).await {
                    Ok(response) => Some((provider_name, response)),
                    Err(e) => {
                        tracing::error!("Provider {} failed: {}", provider_name, e);
                        None
                    }
                }
            }
        });

        futures::future::join_all(tasks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Generate from a specific provider with a model override.
    /// model_id format: "provider:model" (e.g., "openai:gpt-4o", "ollama:llama3.2")
    pub async fn generate_from_model(
        &self,
        model_id: &str,
        request: GenerateRequest,
    ) -> LlmResult<(String, GenerateResponse)> {
        let (provider_name, model_name) = model_id.split_once(':').ok_or_else(|| {
            LlmError::ConfigError(
                "Invalid model ID format, expected 'provider:model'".to_string(),
            )
        })?;

        let provider = self
            .providers
            .iter()
            .find(|p| p.name() == provider_name)
            .ok_or_else(|| {
                LlmError::ConfigError(format!("Provider '{}' not configured", provider_name))
            })?;

        let request_with_override = GenerateRequest {
            model_override: Some(model_name.to_string()),
            ..request
        };

        let response = provider.generate(request_with_override).await?;
        Ok((provider_name.to_string(), response))
    }

    /// Generate a batch of questions.
    ///
    /// With `model_id` only that provider is asked; otherwise every provider
    /// is asked concurrently and the replies are merged. Questions repeating
    /// an avoided text or another reply's question are dropped.
    pub async fn generate_questions(
        &self,
        request: &QuestionRequest,
        config: &LlmConfig,
        model_id: Option<&str>,
    ) -> LlmResult<Vec<QuestionRecord>> {
        let generate = GenerateRequest {
            system: QUESTION_SYSTEM_PROMPT.to_string(),
            prompt: build_question_prompt(request),
            json: true,
            max_tokens: Some(config.default_max_tokens),
            timeout: config.default_timeout,
            model_override: None,
        };

        let responses = match model_id {
            Some(model_id) => vec![self.generate_from_model(model_id, generate).await?],
            None => self.generate_from_all(generate).await,
        };
        if responses.is_empty() {
            return Err(LlmError::ApiError(
                "No provider returned a response".to_string(),
            ));
        }

        let mut seen: HashSet<String> = request.avoid.iter().map(|t| normalize_text(t)).collect();
        let mut questions = Vec::new();
        let mut last_error = None;

        for (provider, response) in responses {
            match parse_generated_questions(&response.text) {
                Ok(records) => {
                    tracing::info!(
                        "{} ({}) generated {} questions in {}ms",
                        provider,
                        response.metadata.model,
                        records.len(),
                        response.metadata.latency_ms
                    );
                    questions.extend(
                        records
                            .into_iter()
                            .filter(|r| seen.insert(normalize_text(&r.text))),
                    );
                }
                Err(e) => {
                    tracing::warn!("Discarding reply from {}: {}", provider, e);
                    last_error = Some(e);
                }
            }
        }

        match (questions.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(questions),
        }
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for LLM requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(60),
            default_max_tokens: 2000,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            openai_api_key: env_value("OPENAI_API_KEY"),
            openai_model: env_value("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url: env_value("OLLAMA_BASE_URL"),
            ollama_model: env_value("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: env_value("LLM_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: env_value("LLM_MAX_TOKENS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_max_tokens),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Provider replying with canned text
    struct CannedProvider {
        name: &'static str,
        reply: LlmResult<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
            assert!(request.json);
            let text = match &self.reply {
                Ok(text) => text.to_string(),
                Err(_) => return Err(LlmError::ApiError("canned failure".to_string())),
            };
            Ok(GenerateResponse {
                text,
                metadata: ResponseMetadata {
                    provider: self.name.to_string(),
                    model: request
                        .model_override
                        .unwrap_or_else(|| "canned".to_string()),
                    tokens_used: None,
                    latency_ms: 1,
                },
            })
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    const REPLY_A: &str = r#"{"questions": [
        {"question": "What does CPU stand for?", "options": ["Central Processing Unit", "Core Power Unit", "Central Program Utility", "Computer Personal Unit"], "correct": 0, "category": "Hardware"},
        {"question": "Which port does HTTPS use?", "options": ["80", "443", "21", "25"], "correct": 1, "category": "Computer Networks"}
    ]}"#;

    const REPLY_B: &str = "```json\n[{\"question\": \"what does cpu stand for?\", \"options\": [\"a\", \"b\", \"c\", \"d\"], \"correct\": 2},\n {\"question\": \"What is SQL?\", \"options\": [\"A query language\", \"A database\", \"A protocol\", \"An OS\"], \"correct\": 0, \"category\": \"Databases\"}]\n```";

    fn canned(name: &'static str, reply: LlmResult<&'static str>) -> Box<dyn LlmProvider> {
        Box::new(CannedProvider { name, reply })
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.ollama_model, "llama3.2");
        assert_eq!(config.default_timeout, Duration::from_secs(60));
        assert!(config.build_manager().is_err());
    }

    #[test]
    fn test_prompt_mentions_count_topics_and_avoid_list() {
        let request = QuestionRequest {
            count: 7,
            topics: vec!["Databases".to_string()],
            avoid: vec!["What is SQL?".to_string()],
        };
        let prompt = build_question_prompt(&request);
        assert!(prompt.contains("Generate 7"));
        assert!(prompt.contains("basic concepts of Databases"));
        assert!(prompt.contains("- What is SQL?"));
        assert!(prompt.contains("\"questions\""));

        let prompt = build_question_prompt(&QuestionRequest::default());
        assert!(prompt.contains("Generate 10"));
        assert!(prompt.contains("Operating Systems"));
        assert!(!prompt.contains("AVOID"));
    }

    #[test]
    fn test_parse_strips_code_fence() {
        let records = parse_generated_questions(REPLY_B).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].category, "Databases");

        assert_eq!(parse_generated_questions(REPLY_A).unwrap().len(), 2);
        assert!(matches!(
            parse_generated_questions("Sorry, I can't help with that."),
            Err(LlmError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_questions_merges_and_dedups() {
        let manager = LlmManager::new(vec![
            canned("a", Ok(REPLY_A)),
            canned("b", Ok(REPLY_B)),
            canned("broken", Err(LlmError::Timeout(Duration::from_secs(1)))),
        ]);
        let request = QuestionRequest {
            avoid: vec!["Which port does HTTPS use?".to_string()],
            ..Default::default()
        };

        let questions = manager
            .generate_questions(&request, &LlmConfig::default(), None)
            .await
            .unwrap();
        let texts: Vec<&str> = questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["What does CPU stand for?", "What is SQL?"]);
    }

    #[tokio::test]
    async fn test_generate_questions_from_named_model() {
        let manager = LlmManager::new(vec![canned("a", Ok(REPLY_A)), canned("b", Ok(REPLY_B))]);

        let questions = manager
            .generate_questions(&QuestionRequest::default(), &LlmConfig::default(), Some("b:big"))
            .await
            .unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "what does cpu stand for?");

        let missing = manager
            .generate_questions(&QuestionRequest::default(), &LlmConfig::default(), Some("c:x"))
            .await;
        assert!(matches!(missing, Err(LlmError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_generate_questions_reports_unusable_replies() {
        let manager = LlmManager::new(vec![canned("a", Ok("not json at all"))]);
        let result = manager
            .generate_questions(&QuestionRequest::default(), &LlmConfig::default(), None)
            .await;
        assert!(matches!(result, Err(LlmError::ParseError(_))));

        let manager = LlmManager::new(vec![canned(
            "a",
            Err(LlmError::Timeout(Duration::from_secs(1))),
        )]);
        let result = manager
            .generate_questions(&QuestionRequest::default(), &LlmConfig::default(), None)
            .await;
        assert!(matches!(result, Err(LlmError::ApiError(_))));
    }
}
