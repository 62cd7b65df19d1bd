//! Routes for the study notes server

pub mod chat;
pub mod pages;

use axum::{
    routing::{get, post},
    Router,
};
use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Chat
        .route("/ask", post(chat::ask))
        .route("/transcript", get(chat::transcript))
        .route("/clear", post(chat::clear))
        // Info
        .route("/info", get(chat::info))
}

/// Build the HTML chat page routes
pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::index))
        .route("/chat", post(pages::chat))
        .route("/clear", post(pages::clear))
}
