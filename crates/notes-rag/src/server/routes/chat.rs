//! JSON chat endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::session::{Exchange, SetupReport};
use crate::types::ChatEntry;

/// Body of `POST /api/ask`
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Body of `GET /api/transcript`
#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub entries: Vec<ChatEntry>,
}

/// Body of `GET /api/info`
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SetupReport>,
}

/// POST /api/ask - Answer a question from the notes
///
/// Until setup finishes the request is refused and the transcript is left alone.
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Exchange>> {
    if !state.is_ready() {
        return Err(Error::NotReady);
    }

    tracing::info!("Question: \"{}\"", request.question.trim());
    let exchange = state.session().lock().await.submit(&request.question).await?;
    Ok(Json(exchange))
}

/// GET /api/transcript - Entries so far, oldest first
pub async fn transcript(State(state): State<AppState>) -> Json<TranscriptResponse> {
    let session = state.session().lock().await;
    Json(TranscriptResponse {
        entries: session.transcript().entries().to_vec(),
    })
}

/// POST /api/clear - Discard the transcript
pub async fn clear(State(state): State<AppState>) -> Json<TranscriptResponse> {
    state.session().lock().await.clear();
    tracing::info!("Transcript cleared");
    Json(TranscriptResponse { entries: Vec::new() })
}

/// GET /api/info - Setup state and summary
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "notes-rag",
        version: env!("CARGO_PKG_VERSION"),
        ready: state.is_ready(),
        setup_error: state.setup_error(),
        report: state.report().await,
    })
}

#[cfg(test)]
mod tests {
    use crate::server::build_router;
    use crate::server::state::AppState;
    use crate::session::SessionContext;
    use crate::test_support::{offline_config, write_pdf};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn ready_state(notes: &TempDir, index: &TempDir) -> AppState {
        write_pdf(notes.path(), "unit1.pdf", &["Neural networks are layered."]);
        let session = SessionContext::start(offline_config(notes.path(), index.path()))
            .await
            .unwrap();
        AppState::from_session(session)
    }

    fn ask_request(question: &str) -> Request<Body> {
        Request::post("/api/ask")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "question": question }).to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ask_appends_exchange() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        let state = ready_state(&notes, &index).await;
        let router = build_router(state.clone(), false);

        let response = router.oneshot(ask_request("What are neural networks?")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["answer"]["mode"], "retrieval_only");
        assert_eq!(body["entries"][0]["role"], "user");
        assert_eq!(body["entries"][1]["role"], "assistant");
        assert_eq!(state.session().lock().await.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        let state = ready_state(&notes, &index).await;
        let router = build_router(state.clone(), false);

        let response = router.oneshot(ask_request("   ")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.session().lock().await.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_ask_before_setup_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(offline_config(dir.path(), dir.path()));
        let router = build_router(state.clone(), false);

        let response = router.oneshot(ask_request("anything")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "not_ready");
        assert!(state.session().lock().await.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_clear_empties_transcript() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        let state = ready_state(&notes, &index).await;
        let router = build_router(state.clone(), false);

        router.clone().oneshot(ask_request("What are neural networks?")).await.unwrap();
        let response = router
            .oneshot(Request::post("/api/clear").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.session().lock().await.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_info_and_readiness_follow_setup() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(offline_config(&dir.path().join("missing"), dir.path()));
        let router = build_router(state.clone(), false);

        let ready = router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.initialize().await;
        assert!(!state.is_ready());

        let info = router
            .oneshot(Request::get("/api/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(info).await;
        assert_eq!(body["ready"], false);
        assert!(body["setup_error"].as_str().is_some());
    }
}
