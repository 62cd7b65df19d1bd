//! Server-rendered chat page

use axum::{
    extract::State,
    response::{Html, Redirect},
    Form,
};
use serde::Deserialize;

use crate::server::state::AppState;
use crate::session::SetupReport;
use crate::types::{ChatEntry, ChatRole};

const TITLE: &str = "Study Notes Assistant";
const SUBTITLE: &str = "Ask questions about your TSA study notes";
const READY_MESSAGE: &str = "System ready! Start chatting below.";
const SETTING_UP_MESSAGE: &str = "Setting up the assistant. Loading and indexing your notes...";
const PLACEHOLDER: &str = "e.g. Explain types of machine learning...";

const STYLE: &str = "body{font-family:sans-serif;max-width:860px;margin:2rem auto;padding:0 1rem}\
.banner{padding:.6rem 1rem;border-radius:6px;margin-bottom:1rem}\
.ready{background:#e6f4ea}.pending{background:#fff8e1}.failed{background:#fdecea}\
.entry{margin:.8rem 0}.content{white-space:pre-wrap}.error{color:#b00020}\
.sources{color:#555;font-size:.9rem;margin:.3rem 0 0 1rem}\
form{display:inline}input[type=text]{width:70%;padding:.4rem}";

/// Form body of `POST /chat`
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub question: String,
}

/// GET / - The chat page
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let entries = state.session().lock().await.transcript().entries().to_vec();
    let report = state.report().await;
    Html(render_page(
        state.is_ready(),
        state.setup_error().as_deref(),
        report.as_ref(),
        &entries,
    ))
}

/// POST /chat - Ask a question, then show the page again
pub async fn chat(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Redirect {
    if state.is_ready() {
        if let Err(e) = state.session().lock().await.submit(&form.question).await {
            tracing::debug!("Question not submitted: {}", e);
        }
    }
    Redirect::to("/")
}

/// POST /clear - Discard the transcript
pub async fn clear(State(state): State<AppState>) -> Redirect {
    state.session().lock().await.clear();
    Redirect::to("/")
}

fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

fn render_banner(ready: bool, setup_error: Option<&str>, report: Option<&SetupReport>) -> String {
    if let Some(error) = setup_error {
        return format!(
            "<div class=\"banner failed\">Setup failed: {}</div>",
            escape(error)
        );
    }
    if !ready {
        return format!("<div class=\"banner pending\">{}</div>", SETTING_UP_MESSAGE);
    }

    let mut banner = format!("<div class=\"banner ready\">{}", READY_MESSAGE);
    if let Some(report) = report {
        banner.push_str(&format!(
            "<br><small>{} files, {} pages, {} chunks indexed</small>",
            report.files.len(),
            report.pages,
            report.indexed
        ));
        if let Some(error) = &report.llm_error {
            banner.push_str(&format!(
                "<br><small>AI answers unavailable, showing raw notes: {}</small>",
                escape(error)
            ));
        }
    }
    banner.push_str("</div>");
    banner
}

fn render_entry(entry: &ChatEntry) -> String {
    let (label, class) = match (entry.role, entry.is_error) {
        (ChatRole::User, _) => ("You:", "content"),
        (ChatRole::Assistant, false) => ("AI:", "content"),
        (ChatRole::Assistant, true) => ("AI:", "content error"),
    };

    let mut html = format!(
        "<div class=\"entry\"><strong>{}</strong><div class=\"{}\">{}</div>",
        label,
        class,
        escape(&entry.content)
    );
    if !entry.sources.is_empty() {
        html.push_str("<ul class=\"sources\">");
        for (i, source) in entry.sources.iter().enumerate() {
            html.push_str(&format!("<li>{}</li>", escape(&source.format_numbered(i + 1))));
        }
        html.push_str("</ul>");
    }
    html.push_str("</div>");
    html
}

/// Render the full page
pub fn render_page(
    ready: bool,
    setup_error: Option<&str>,
    report: Option<&SetupReport>,
    entries: &[ChatEntry],
) -> String {
    let transcript: String = entries.iter().map(render_entry).collect();

    let controls = if ready {
        format!(
            "<form method=\"post\" action=\"/chat\">\
<input type=\"text\" name=\"question\" placeholder=\"{}\" autofocus>\
<button type=\"submit\">Send</button></form> \
<form method=\"post\" action=\"/clear\"><button type=\"submit\">Clear Chat</button></form>",
            PLACEHOLDER
        )
    } else {
        String::new()
    };

    // Refresh while setup is still running
    let refresh = if !ready && setup_error.is_none() {
        "<meta http-equiv=\"refresh\" content=\"3\">"
    } else {
        ""
    };

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">{refresh}<title>{title}</title>\
<style>{style}</style></head><body><h1>🎓 {title}</h1><p>{subtitle}</p>{banner}\
<div class=\"transcript\">{transcript}</div>{controls}</body></html>",
        refresh = refresh,
        title = TITLE,
        style = STYLE,
        subtitle = SUBTITLE,
        banner = render_banner(ready, setup_error, report),
        transcript = transcript,
        controls = controls,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use crate::session::SessionContext;
    use crate::test_support::{offline_config, write_pdf};
    use crate::types::SourceRef;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[test]
    fn test_render_escapes_and_lists_sources() {
        let mut answer = ChatEntry::user("<b>notes</b>");
        answer.role = ChatRole::Assistant;
        answer.sources = vec![SourceRef {
            chunk_id: uuid::Uuid::new_v4(),
            content: "Cells divide.".to_string(),
            unit: "unit1".to_string(),
            source: "unit1.pdf".to_string(),
            page: 2,
            similarity: 0.8,
        }];

        let html = render_page(true, None, None, &[ChatEntry::user("Why?"), answer]);

        assert!(html.contains("You:"));
        assert!(html.contains("AI:"));
        assert!(html.contains("&lt;b&gt;notes&lt;/b&gt;"));
        assert!(html.contains("Source 1: Unit unit1 - Page 2"));
        assert!(html.contains(READY_MESSAGE));
        assert!(html.contains("Clear Chat"));
    }

    #[test]
    fn test_render_hides_input_until_ready() {
        let pending = render_page(false, None, None, &[]);
        assert!(pending.contains(SETTING_UP_MESSAGE));
        assert!(!pending.contains("action=\"/chat\""));

        let failed = render_page(false, Some("Notes directory not found"), None, &[]);
        assert!(failed.contains("Setup failed: Notes directory not found"));
        assert!(!failed.contains("http-equiv"));
    }

    #[tokio::test]
    async fn test_form_post_records_exchange_and_redirects() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        write_pdf(notes.path(), "unit1.pdf", &["Neural networks are layered."]);
        let session = SessionContext::start(offline_config(notes.path(), index.path()))
            .await
            .unwrap();
        let state = AppState::from_session(session);
        let router = build_router(state.clone(), false);

        let response = router
            .clone()
            .oneshot(
                Request::post("/chat")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("question=What+are+neural+networks%3F"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(state.session().lock().await.transcript().len(), 2);

        let page = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(page.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("What are neural networks?"));
        assert!(html.contains("Source 1: Unit unit1 - Page 1"));
    }
}
