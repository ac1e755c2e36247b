//! HTTP API for the game frontend and for question bank administration.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;

use crate::auth::{admin_auth_middleware, AdminAuthConfig};
use crate::bank::{BankError, SavedBatch, SavedFile};
use crate::ladder::PrizeLadder;
use crate::llm::{list_local_models, LlmConfig, LlmError, QuestionRequest};
use crate::prepare::PreparedRound;
use crate::scores::{scores_csv, ScoreStoreError};
use crate::session::{AnswerOutcome, GameError, LifelineHint, SessionView};
use crate::source::pool_from_value;
use crate::state::{AppState, GenerateError};
use crate::types::{PreparedQuestion, ScoreEntry};

/// Errors returned by API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Bank(#[from] BankError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Scores(#[from] ScoreStoreError),

    #[error("{0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Game(e) => match e {
                GameError::NoQuestions | GameError::InsufficientPool { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GameError::InvalidChoice(_) => StatusCode::BAD_REQUEST,
                GameError::Finished | GameError::LifelineUnavailable => StatusCode::CONFLICT,
                GameError::NotFound(_) => StatusCode::NOT_FOUND,
            },
            ApiError::Bank(e) | ApiError::Generate(GenerateError::Bank(e)) => match e {
                BankError::InvalidFilename(_) | BankError::EmptyBatch => StatusCode::BAD_REQUEST,
                BankError::Io(_) | BankError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Generate(GenerateError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Generate(GenerateError::Llm(LlmError::Timeout(_))) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Generate(GenerateError::Llm(LlmError::ConfigError(_))) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Generate(GenerateError::Llm(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Scores(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the full router: public game routes, admin routes behind Basic
/// auth, and the static frontend as fallback
pub fn create_router(state: Arc<AppState>, auth_config: Arc<AdminAuthConfig>) -> Router {
    let static_dir = state.config.static_dir.clone();

    let admin_routes = Router::new()
        .route("/api/questions", post(save_questions))
        .route("/api/questions/generate", post(generate_questions))
        .route("/api/save-generated-questions", post(save_questions))
        .route("/api/scores", axum::routing::delete(clear_scores))
        .route_layer(middleware::from_fn_with_state(
            auth_config,
            admin_auth_middleware,
        ));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/ladder", get(ladder))
        .route("/api/models", get(list_available_models))
        .route("/api/questions/random", get(random_round))
        .route("/api/questions/prepare", post(prepare_round))
        .route("/api/questions/files", get(list_files))
        .route("/api/get-random-questions", get(random_questions_legacy))
        .route("/api/games", post(start_game))
        .route("/api/games/{id}", get(get_game))
        .route("/api/games/{id}/answer", post(answer))
        .route("/api/games/{id}/timeout", post(time_out))
        .route("/api/games/{id}/lifeline", post(lifeline))
        .route("/api/scores", get(list_scores))
        .route("/api/scores.csv", get(export_scores))
        .merge(admin_routes)
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// GET /api/health
async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/ladder
async fn ladder(State(state): State<Arc<AppState>>) -> Json<PrizeLadder> {
    Json(*state.preparer.ladder())
}

/// Response structure for available models
#[derive(Debug, Clone, Serialize)]
pub struct AvailableModelsResponse {
    pub openai_models: Vec<String>,
    pub ollama_models: Vec<String>,
    pub default_model: Option<String>,
}

/// Static list of OpenAI models to offer
const OPENAI_MODELS: &[&str] = &["gpt-4o-mini", "gpt-4o", "gpt-4.1", "gpt-4.1-mini"];

/// List model ids ("provider:model") usable for question generation.
///
/// GET /api/models
async fn list_available_models(
    State(state): State<Arc<AppState>>,
) -> Json<AvailableModelsResponse> {
    let config = &state.llm_config;

    let openai_models: Vec<String> = if config.openai_api_key.is_some() {
        let mut models: Vec<String> = OPENAI_MODELS.iter().map(|m| m.to_string()).collect();
        if !models.contains(&config.openai_model) {
            models.insert(0, config.openai_model.clone());
        }
        models.into_iter().map(|m| format!("openai:{}", m)).collect()
    } else {
        vec![]
    };

    let ollama_models: Vec<String> = match &config.ollama_base_url {
        Some(base_url) => match list_local_models(base_url).await {
            Ok(models) => models
                .into_iter()
                .map(|m| format!("ollama:{}", m))
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to list Ollama models: {}", e);
                vec![]
            }
        },
        None => vec![],
    };

    Json(AvailableModelsResponse {
        openai_models,
        ollama_models,
        default_model: default_model(config),
    })
}

fn default_model(config: &LlmConfig) -> Option<String> {
    if config.openai_api_key.is_some() {
        return Some(format!("openai:{}", config.openai_model));
    }
    config
        .ollama_base_url
        .as_ref()
        .map(|_| format!("ollama:{}", config.ollama_model))
}

/// GET /api/questions/random
async fn random_round(State(state): State<Arc<AppState>>) -> Json<PreparedRound> {
    Json(state.prepare_round(&HashSet::new()).await)
}

/// GET /api/get-random-questions
///
/// Bare array of prepared questions, for older frontends.
async fn random_questions_legacy(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<PreparedQuestion>> {
    Json(state.prepare_round(&HashSet::new()).await.into_questions())
}

#[derive(Debug, Default, Deserialize)]
pub struct PrepareBody {
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// POST /api/questions/prepare
async fn prepare_round(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PrepareBody>,
) -> Json<PreparedRound> {
    let exclude: HashSet<String> = body.exclude.into_iter().collect();
    Json(state.prepare_round(&exclude).await)
}

/// GET /api/questions/files
async fn list_files(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SavedFile>> {
    Ok(Json(state.bank.list_files().await?))
}

/// POST /api/questions
///
/// Accepts a bare array of questions or `{"questions": [...], "filename": "..."}`.
async fn save_questions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<SavedBatch>), ApiError> {
    let filename = body
        .get("filename")
        .and_then(Value::as_str)
        .map(str::to_string);
    let pool = pool_from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut saved = state
        .save_questions(pool.records, filename.as_deref())
        .await?;
    saved.rejected += pool.malformed;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateBody {
    pub count: Option<usize>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
    /// "provider:model"; all providers when absent
    pub model: Option<String>,
    pub filename: Option<String>,
}

/// POST /api/questions/generate
async fn generate_questions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<SavedBatch>), ApiError> {
    let defaults = QuestionRequest::default();
    let request = QuestionRequest {
        count: body.count.filter(|&c| c > 0).unwrap_or(defaults.count),
        topics: body.topics,
        avoid: body.avoid,
    };

    let saved = state
        .generate_questions(request, body.model.as_deref(), body.filename.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Deserialize)]
pub struct StartGameBody {
    #[serde(default)]
    pub player_name: String,
    /// Replaces the previous-round exclusion when present
    pub exclude: Option<Vec<String>>,
}

/// POST /api/games
async fn start_game(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartGameBody>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let view = state.start_game(&body.player_name, body.exclude).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/games/{id}
async fn get_game(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<SessionView> {
    Ok(Json(state.get_session(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
    pub choice: usize,
    /// Client's own measurement; only counts when longer than the server's
    #[serde(default)]
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub outcome: AnswerOutcome,
    pub session: SessionView,
}

/// POST /api/games/{id}/answer
async fn answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AnswerBody>,
) -> ApiResult<MoveResponse> {
    let (outcome, session) = state
        .answer(&id, body.choice, Duration::from_millis(body.elapsed_ms))
        .await?;
    Ok(Json(MoveResponse { outcome, session }))
}

/// POST /api/games/{id}/timeout
async fn time_out(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<MoveResponse> {
    let (outcome, session) = state.time_out(&id).await?;
    Ok(Json(MoveResponse { outcome, session }))
}

/// POST /api/games/{id}/lifeline
async fn lifeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<LifelineHint> {
    Ok(Json(state.phone_a_friend(&id).await?))
}

/// GET /api/scores
async fn list_scores(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ScoreEntry>> {
    Ok(Json(state.scores.list().await?))
}

/// GET /api/scores.csv
async fn export_scores(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let entries = state.scores.list().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"millionaire_scores.csv\"",
            ),
        ],
        scores_csv(&entries),
    )
        .into_response())
}

/// DELETE /api/scores
async fn clear_scores(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.scores.clear().await?;
    tracing::info!("Score history cleared");
    Ok(StatusCode::NO_CONTENT)
}
