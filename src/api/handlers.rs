//! HTTP request handlers

use super::types::{
    ContinueRequest, ConversationResponse, CreateProfileRequest, DeskDecorResponse, ErrorResponse,
    GenerateQuery, ProfileResponse,
};
use super::AppState;
use crate::db::{Gender, UserProfile};
use crate::gateway::GatewayError;
use crate::llm::ProviderKind;
use crate::sse;
use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;

const CONVERSATION_PATH: &str = "/api/fortune/conversation";
const DESK_DECOR_PATH: &str = "/api/fortune/desk-decor";
const GENERATE_PATH: &str = "/api/fortune";

/// Fallbacks when a request has no cached reading to mine yet
const DEFAULT_TIP: &str = "今天是个好日子";
const DEFAULT_DECOR: &str = "貔貅";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Streaming generation; the request URL is the cache fingerprint
        .route(GENERATE_PATH, get(generate))
        // Visible history + conversation id for a generation request
        .route(CONVERSATION_PATH, get(get_conversation))
        // Tips and ornament keyword mined from the cached reading
        .route(DESK_DECOR_PATH, get(get_desk_decor))
        // Follow-up turns
        .route("/api/fortune/continue", post(continue_conversation))
        // Profile store
        .route("/api/profiles", post(create_profile))
        .route("/api/profiles/:uid", get(get_profile))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Generation
// ============================================================

async fn generate(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<GenerateQuery>,
) -> Result<Response, AppError> {
    let provider = resolve_provider(&state, query.provider.as_deref())?;

    let profile = state
        .db
        .find_profile(&query.fortune_telling_uid)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| {
            AppError::NotFound(format!("unknown user: {}", query.fortune_telling_uid))
        })?;

    let fingerprint = fingerprint_of(&uri);
    Ok(sse::response(state.gateway.generate(fingerprint, provider, profile)))
}

// ============================================================
// Conversation Retrieval
// ============================================================

async fn get_conversation(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<ConversationResponse>, AppError> {
    // The stored fingerprint is the generation URL; recover it from this
    // request's URL by swapping the path back.
    let fingerprint = fingerprint_of(&uri).replacen(CONVERSATION_PATH, GENERATE_PATH, 1);

    let view = state.gateway.conversation_view(&fingerprint).map_err(|e| match e {
        GatewayError::ConversationNotFound => AppError::NotFound(e.to_string()),
        other => AppError::Internal(other.to_string()),
    })?;

    Ok(Json(ConversationResponse {
        conversation_id: view.conversation_id,
        conversation_history: view.history,
    }))
}

// ============================================================
// Continuation
// ============================================================

async fn continue_conversation(
    State(state): State<AppState>,
    Json(request): Json<ContinueRequest>,
) -> Result<Response, AppError> {
    let provider = resolve_provider(&state, request.provider.as_deref())?;

    Ok(sse::response(state.gateway.continue_chat(
        request.conversation_id,
        request.prompt,
        provider,
    )))
}

// ============================================================
// Desk Decor Extraction
// ============================================================

async fn get_desk_decor(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<DeskDecorResponse>, AppError> {
    let fingerprint = fingerprint_of(&uri).replacen(DESK_DECOR_PATH, GENERATE_PATH, 1);

    let entry = state
        .db
        .find_by_fingerprint(&fingerprint)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let Some(entry) = entry else {
        return Ok(Json(DeskDecorResponse {
            tips: vec![DEFAULT_TIP.to_string()],
            desk_decor: Some(DEFAULT_DECOR.to_string()),
        }));
    };

    // The first assistant reply carries the tip/ornament markup
    let reading = entry
        .history
        .get(entry.priming_turns)
        .map(|turn| turn.content.as_str())
        .unwrap_or_default();

    Ok(Json(DeskDecorResponse {
        tips: extract_tips(reading),
        desk_decor: extract_desk_decor(reading),
    }))
}

fn extract_tips(content: &str) -> Vec<String> {
    let re = Regex::new(r#"<div class="fortune-tip">([^<]+)</div>"#).expect("valid tip pattern");
    re.captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn extract_desk_decor(content: &str) -> Option<String> {
    let img = Regex::new(r#"<img class="desk-decor" src="([^"]+)" />"#)
        .expect("valid decor pattern");
    let keyword = Regex::new(r#"keyword=([^&"]+)"#).expect("valid keyword pattern");

    let src = img.captures(content)?.get(1)?.as_str().to_string();
    Some(keyword.captures(&src)?.get(1)?.as_str().to_string())
}

// ============================================================
// Profiles
// ============================================================

async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let gender = Gender::parse(&request.gender)
        .ok_or_else(|| AppError::BadRequest(format!("unknown gender: {}", request.gender)))?;

    let profile = UserProfile {
        uid: request.fortune_telling_uid,
        username: request.username,
        gender,
        birth_date: request.birth_date,
        birth_time: request.birth_time,
        created_at: Utc::now(),
    };

    state
        .db
        .create_profile(&profile)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(ProfileResponse {
        profile: serde_json::to_value(profile).unwrap_or(Value::Null),
    }))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = state
        .db
        .find_profile(&uid)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("unknown user: {uid}")))?;

    Ok(Json(ProfileResponse {
        profile: serde_json::to_value(profile).unwrap_or(Value::Null),
    }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("fortuned ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Helpers
// ============================================================

/// Full request identity (path + query), the cache key for a generation
fn fingerprint_of(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Parse the optional provider parameter and verify it is configured.
/// Both failure modes are reported before any SSE bytes are written.
fn resolve_provider(state: &AppState, param: Option<&str>) -> Result<ProviderKind, AppError> {
    let kind = match param {
        None => ProviderKind::DeepSeek,
        Some(value) => ProviderKind::from_param(value)
            .ok_or_else(|| AppError::BadRequest(format!("unsupported provider: {value}")))?,
    };

    if state.registry.get(kind).is_none() {
        return Err(AppError::BadRequest(format!(
            "provider not configured: {}",
            kind.as_str()
        )));
    }
    Ok(kind)
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pacing;
    use crate::db::{CacheEntry, Database};
    use crate::gateway::testing::ScriptedClient;
    use crate::llm::{ProviderRegistry, Turn};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app(client: ScriptedClient) -> (Router, Database) {
        let db = Database::open_in_memory().unwrap();
        let registry =
            ProviderRegistry::new_empty().with_client(ProviderKind::DeepSeek, Arc::new(client));
        let state = AppState::new(db.clone(), Arc::new(registry), Pacing::instant());
        (create_router(state), db)
    }

    fn seed_profile(db: &Database) {
        db.create_profile(&UserProfile {
            uid: "u1".to_string(),
            username: "小明".to_string(),
            gender: Gender::Male,
            birth_date: "1995-08-12".to_string(),
            birth_time: "07:30".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_generate_streams_exact_wire_protocol() {
        let (app, db) = test_app(ScriptedClient::new(&["hello ", "world"]));
        seed_profile(&db);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fortune?fortune_telling_uid=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert_eq!(response.headers()["x-accel-buffering"], "no");

        let body = body_string(response).await;
        assert_eq!(
            body,
            "data: {\"content\":\"hello \"}\n\ndata: {\"content\":\"world\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_stream_ends_with_single_done_sentinel() {
        let (app, db) = test_app(ScriptedClient::new(&["hi"]));
        seed_profile(&db);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fortune?fortune_telling_uid=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_string(response).await;
        assert_eq!(body.matches("data: [DONE]\n\n").count(), 1);
        assert!(body.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_second_generate_replays_from_cache() {
        let (app, db) = test_app(ScriptedClient::new(&["hello ", "world"]));
        seed_profile(&db);

        let request = || {
            Request::builder()
                .uri("/api/fortune?fortune_telling_uid=u1")
                .body(Body::empty())
                .unwrap()
        };
        body_string(app.clone().oneshot(request()).await.unwrap()).await;
        let replayed = body_string(app.clone().oneshot(request()).await.unwrap()).await;

        // Replay re-slices the stored text: one chunk, then the sentinel
        assert_eq!(
            replayed,
            "data: {\"content\":\"hello world\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_generate_unknown_user_is_404_before_streaming() {
        let (app, _db) = test_app(ScriptedClient::new(&["x"]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fortune?fortune_telling_uid=ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_string(response).await;
        assert!(body.contains("unknown user"));
    }

    #[tokio::test]
    async fn test_generate_unsupported_provider_is_400() {
        let (app, db) = test_app(ScriptedClient::new(&["x"]));
        seed_profile(&db);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fortune?fortune_telling_uid=u1&provider=mystery")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_conversation_view_after_generation() {
        let (app, db) = test_app(ScriptedClient::new(&["reading"]));
        seed_profile(&db);

        body_string(
            app.clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/fortune?fortune_telling_uid=u1")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fortune/conversation?fortune_telling_uid=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["conversation_id"].as_str().unwrap().contains('_'));
        // A fresh conversation has no visible turns
        assert_eq!(body["conversation_history"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_conversation_view_unknown_fingerprint_is_404() {
        let (app, _db) = test_app(ScriptedClient::new(&[]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fortune/conversation?fortune_telling_uid=ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_continue_unknown_conversation_streams_error_frame() {
        let (app, _db) = test_app(ScriptedClient::new(&["x"]));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/fortune/continue")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"conversationId":"missing","prompt":"hello"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Streaming endpoint: still 200, error framed in-band
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert_eq!(
            body,
            "event: error\ndata: {\"error\":\"conversation not found\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_desk_decor_extraction_and_fallback() {
        let (app, db) = test_app(ScriptedClient::new(&[]));

        let reading = concat!(
            r#"<div class="fortune-tip">宜静不宜动</div>"#,
            r#"<div class="fortune-tip">财运在西南</div>"#,
            r#" <img class="desk-decor" src="/api/random-desk-decor?keyword=金蟾" />"#,
        );
        db.create_if_absent(&CacheEntry {
            fingerprint: "/api/fortune?fortune_telling_uid=u1".to_string(),
            conversation_id: "c1".to_string(),
            history: vec![
                Turn::system("s"),
                Turn::user("u"),
                Turn::assistant(reading),
            ],
            final_text: reading.to_string(),
            priming_turns: 2,
            created_at: Utc::now(),
        })
        .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/fortune/desk-decor?fortune_telling_uid=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["tips"].as_array().unwrap().len(), 2);
        assert_eq!(body["tips"][0], "宜静不宜动");
        assert_eq!(body["deskDecor"], "金蟾");

        // No cached reading yet: canned fallback
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fortune/desk-decor?fortune_telling_uid=ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["tips"][0], DEFAULT_TIP);
        assert_eq!(body["deskDecor"], DEFAULT_DECOR);
    }

    #[tokio::test]
    async fn test_profile_create_and_fetch() {
        let (app, _db) = test_app(ScriptedClient::new(&[]));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/profiles")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"fortune_telling_uid":"u9","username":"小红","gender":"female","birth_date":"1990-01-02","birth_time":"23:10"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/profiles/u9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["profile"]["username"], "小红");
        assert_eq!(body["profile"]["gender"], "female");
    }

    #[test]
    fn test_extract_desk_decor_requires_keyword() {
        assert_eq!(
            extract_desk_decor(r#"<img class="desk-decor" src="/api/random-desk-decor?keyword=葫芦" />"#),
            Some("葫芦".to_string())
        );
        assert_eq!(
            extract_desk_decor(r#"<img class="desk-decor" src="/static/decor.png" />"#),
            None
        );
        assert_eq!(extract_desk_decor("no markup at all"), None);
    }
}
