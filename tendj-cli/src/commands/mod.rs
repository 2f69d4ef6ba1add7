pub mod chat;
pub mod completion;
pub mod config;
pub mod history;
pub mod session;

use anyhow::{Context, Result};
use client::{
    ChatController, FileStore, HttpBackend, PushChannel, SessionStore, SignalSink,
    reconcile::ConversationSelector,
};
use shared::config::client::Config;
use tracing::warn;

pub type Controller = ChatController<HttpBackend, FileStore>;

/// Resolved configuration plus the pieces every network command needs.
#[derive(Debug)]
pub struct App {
    pub config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn session_store(&self) -> SessionStore<FileStore> {
        SessionStore::new(
            FileStore::new(&self.config.session.state_path),
            self.config.session.key_prefix.clone(),
        )
    }

    /// Configured token first, then the one saved by `tendj login`.
    pub fn auth_token(&self) -> Option<String> {
        if let Some(token) = &self.config.session.auth_token {
            return Some(token.clone());
        }
        self.session_store().auth_token().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read stored token");
            None
        })
    }

    pub fn backend(&self) -> Result<HttpBackend> {
        HttpBackend::new(self.config.api.clone(), self.auth_token())
            .context("failed to build HTTP client")
    }

    pub fn controller(&self, signals: SignalSink) -> Result<Controller> {
        let selector = ConversationSelector::restore(self.session_store());
        Ok(ChatController::new(self.backend()?, selector, signals)
            .with_refetch_after_send(self.config.chat.refetch_after_send))
    }

    pub fn push_channel(&self, backend: &HttpBackend) -> Result<PushChannel> {
        PushChannel::from_backend(backend).context("invalid push stream endpoint")
    }
}
