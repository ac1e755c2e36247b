use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use millionaire::api::create_router;
use millionaire::auth::AdminAuthConfig;
use millionaire::bank::QuestionBank;
use millionaire::config::AppConfig;
use millionaire::scores::MemoryScoreStore;
use millionaire::source::{QuestionSource, StaticSource};
use millionaire::state::AppState;
use millionaire::types::QuestionRecord;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// "admin:secret"
const ADMIN_CREDENTIALS: &str = "Basic YWRtaW46c2VjcmV0";

fn pool_of(n: usize) -> Vec<QuestionRecord> {
    (0..n)
        .map(|i| {
            QuestionRecord::new(
                format!("Question number {}?", i),
                ["Alpha", "Beta", "Gamma", "Delta"],
                2,
                "General",
            )
        })
        .collect()
}

struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

async fn app_with(source: Option<Vec<QuestionRecord>>, auth: AdminAuthConfig) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let bank = Arc::new(QuestionBank::open(dir.path()).await.unwrap());
    let source: Arc<dyn QuestionSource> = match source {
        Some(pool) => Arc::new(StaticSource::new(pool)),
        None => bank.clone(),
    };
    let config = AppConfig {
        static_dir: dir.path().join("static"),
        ..Default::default()
    };
    let state = AppState::new(config, bank, source, Arc::new(MemoryScoreStore::new()));

    TestApp {
        router: create_router(Arc::new(state), Arc::new(auth)),
        _dir: dir,
    }
}

async fn game_app(pool_size: usize) -> TestApp {
    app_with(Some(pool_of(pool_size)), AdminAuthConfig::default()).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.json(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.json(post_request(uri, body, None)).await
    }
}

fn post_request(uri: &str, body: Value, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health_and_ladder() {
    let app = game_app(12).await;

    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, body) = app.get("/api/ladder").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([100, 500, 1000, 5000, 15000, 50000, 100000, 250000, 500000, 1000000])
    );
}

#[tokio::test]
async fn test_random_round_is_prize_annotated() {
    let app = game_app(12).await;
    let (status, body) = app.get("/api/questions/random").await;
    assert_eq!(status, StatusCode::OK);

    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 10);
    assert_eq!(questions[0]["prize"], 100);
    assert_eq!(questions[9]["prize"], 1_000_000);
    assert_eq!(questions[0]["correct"], 2);
    assert_eq!(body["stats"]["available"], 12);

    let (status, body) = app.get("/api/get-random-questions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_prepare_with_exclusions() {
    let app = game_app(11).await;
    let (status, body) = app
        .post(
            "/api/questions/prepare",
            json!({ "exclude": ["QUESTION NUMBER 0?", "question number 1? "] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["questions"].as_array().unwrap().len(), 9);
    assert_eq!(body["stats"]["excluded"], 2);
}

#[tokio::test]
async fn test_full_game_to_the_million() {
    let app = game_app(15).await;

    let (status, game) = app
        .post("/api/games", json!({ "player_name": "Ana" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(game["status"], "IN_PROGRESS");
    assert_eq!(game["total_questions"], 10);
    assert!(game["current"].get("correct").is_none());
    let id = game["id"].as_str().unwrap().to_string();

    for position in 0..9 {
        let (status, body) = app
            .post(
                &format!("/api/games/{}/answer", id),
                json!({ "choice": 2, "elapsed_ms": 1500 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["result"], "correct");
        assert_eq!(body["outcome"]["next_position"], position + 1);
        assert_eq!(body["session"]["position"], position + 1);
    }

    let (status, body) = app
        .post(
            &format!("/api/games/{}/answer", id),
            json!({ "choice": 2, "elapsed_ms": 1500 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["outcome"],
        json!({ "result": "won", "final_score": 1_000_000 })
    );
    assert_eq!(body["session"]["status"], "WON");

    let (_, scores) = app.get("/api/scores").await;
    assert_eq!(scores[0]["name"], "Ana");
    assert_eq!(scores[0]["score"], 1_000_000);

    let (status, csv) = app
        .send(Request::get("/api/scores.csv").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(csv).unwrap();
    assert!(csv.starts_with("\u{FEFF}Ranking,Name,Score,Date"));
    assert!(csv.contains("\n1,\"Ana\",1000000,"));
}

#[tokio::test]
async fn test_wrong_answer_ends_game() {
    let app = game_app(12).await;
    let (_, game) = app.post("/api/games", json!({ "player_name": "" })).await;
    let id = game["id"].as_str().unwrap().to_string();
    let answer_uri = format!("/api/games/{}/answer", id);

    let (status, _) = app.post(&answer_uri, json!({ "choice": 7 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.post(&answer_uri, json!({ "choice": 2 })).await;
    let (status, body) = app.post(&answer_uri, json!({ "choice": 0 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["outcome"],
        json!({ "result": "wrong", "correct_index": 2, "final_score": 100 })
    );
    assert!(body["session"]["current"].is_null());

    let (status, _) = app.post(&answer_uri, json!({ "choice": 2 })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, scores) = app.get("/api/scores").await;
    assert_eq!(scores[0]["name"], "Anonymous");
    assert_eq!(scores[0]["score"], 100);
}

#[tokio::test]
async fn test_timeout_and_lifeline() {
    let app = game_app(12).await;
    let (_, game) = app.post("/api/games", json!({ "player_name": "Luis" })).await;
    let id = game["id"].as_str().unwrap().to_string();

    let (status, hint) = app
        .post(&format!("/api/games/{}/lifeline", id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let suggestion = hint["suggestion"].as_u64().unwrap() as usize;
    assert!(suggestion < 4);

    let (status, _) = app
        .post(&format!("/api/games/{}/lifeline", id), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Answer arriving after the 30 second limit counts as a timeout
    let (status, body) = app
        .post(
            &format!("/api/games/{}/answer", id),
            json!({ "choice": 2, "elapsed_ms": 31_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["result"], "timed_out");
    assert_eq!(body["session"]["status"], "TIMED_OUT");

    let (status, _) = app
        .post(&format!("/api/games/{}/timeout", id), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_game_and_short_pool() {
    let app = game_app(5).await;

    let (status, _) = app.get("/api/games/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.post("/api/games", json!({ "player_name": "Eva" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("only 5"));
}

#[tokio::test]
async fn test_admin_routes_require_credentials() {
    let app = app_with(None, AdminAuthConfig::new("admin", "secret")).await;
    let batch = json!({
        "filename": "networks",
        "questions": [
            { "question": "Which port does HTTPS use?", "options": ["80", "443", "21", "25"], "correct": 1, "category": "Networks" },
            { "question": "What does DNS resolve?", "options": ["Names", "Colors", "Files", "Users"], "correct": 0 },
            { "question": "Broken", "options": ["only one"], "correct": 0 }
        ]
    });

    let (status, _) = app
        .send(post_request("/api/questions", batch.clone(), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, saved) = app
        .json(post_request("/api/questions", batch, Some(ADMIN_CREDENTIALS)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(saved["filename"], "networks.json");
    assert_eq!(saved["saved"], 2);
    assert_eq!(saved["rejected"], 1);

    let (status, files) = app.get("/api/questions/files").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(files[0]["name"], "networks.json");

    // The bank is the question source here
    let (_, round) = app.get("/api/questions/random").await;
    assert_eq!(round["questions"].as_array().unwrap().len(), 2);

    let delete = |auth: Option<&str>| {
        let mut builder = Request::builder().method(Method::DELETE).uri("/api/scores");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    };
    let (status, _) = app.send(delete(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send(delete(Some(ADMIN_CREDENTIALS))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_generation_without_llm_is_unavailable() {
    let app = game_app(12).await;
    let (status, body) = app
        .post("/api/questions/generate", json!({ "count": 5 }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_repeated_games_on_small_bank() {
    let app = game_app(12).await;
    for player in ["Ana", "Luis", "Eva", "Ana"] {
        let (status, game) = app.post("/api/games", json!({ "player_name": player })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(game["total_questions"], 10);
    }
}
