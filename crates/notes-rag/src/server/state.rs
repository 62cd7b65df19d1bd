//! Application state for the web shell

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::RagConfig;
use crate::session::{SessionContext, SetupReport};

/// Shared application state
///
/// Requests are served one at a time against the session.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// The session; replaced once setup succeeds
    session: Mutex<SessionContext>,
    /// Ready state
    ready: RwLock<bool>,
    /// Why setup failed, if it did
    setup_error: RwLock<Option<String>>,
}

impl AppState {
    /// State with an unready session; call [`AppState::initialize`] to run setup
    pub fn new(config: RagConfig) -> Self {
        let session = SessionContext::new(config.clone());
        Self::build(config, session, false)
    }

    /// State around an existing session
    pub fn from_session(session: SessionContext) -> Self {
        let ready = session.is_ready();
        Self::build(session.config().clone(), session, ready)
    }

    fn build(config: RagConfig, session: SessionContext, ready: bool) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                session: Mutex::new(session),
                ready: RwLock::new(ready),
                setup_error: RwLock::new(None),
            }),
        }
    }

    /// Run setup and swap the ready session in
    ///
    /// Failures are kept for display and setup is not retried.
    pub async fn initialize(&self) {
        tracing::info!("Setting up the study notes assistant...");
        match SessionContext::start(self.inner.config.clone()).await {
            Ok(session) => {
                *self.inner.session.lock().await = session;
                *self.inner.setup_error.write() = None;
                self.set_ready(true);
                tracing::info!("System ready");
            }
            Err(e) => {
                tracing::error!("Setup failed: {}", e);
                *self.inner.setup_error.write() = Some(e.to_string());
            }
        }
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// The session, locked per request
    pub fn session(&self) -> &Mutex<SessionContext> {
        &self.inner.session
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }

    /// Setup failure message, if setup failed
    pub fn setup_error(&self) -> Option<String> {
        self.inner.setup_error.read().clone()
    }

    /// Setup summary of the current session
    pub async fn report(&self) -> Option<SetupReport> {
        self.inner.session.lock().await.report().cloned()
    }
}
