use std::sync::Arc;

use pumpdesk_llm::{ChatSession, LlmProvider, SessionConfig};
use snafu::ResultExt;

use super::error::{ChatResult, ProviderUnavailableSnafu, SessionInitSnafu};
use super::message::SessionGeneration;

/// Owned slot for the one live chat session.
///
/// The slot never mutates a session in place: `replace` drops the current handle,
/// bumps the generation and installs a fresh one. Work started under an older
/// generation must not commit into the current transcript.
pub struct SessionSlot {
    provider: Result<Arc<dyn LlmProvider>, String>,
    config: SessionConfig,
    handle: Option<Box<dyn ChatSession>>,
    generation: SessionGeneration,
}

impl SessionSlot {
    /// `provider` carries the reason when no provider could be built from settings; every
    /// `replace` then fails with that reason.
    pub fn new(provider: Result<Arc<dyn LlmProvider>, String>, config: SessionConfig) -> Self {
        Self {
            provider,
            config,
            handle: None,
            generation: SessionGeneration::default(),
        }
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&dyn ChatSession> {
        self.handle.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Drops the current session and creates a new one under the next generation.
    ///
    /// The generation advances even when creation fails, so the slot is left empty and
    /// everything opened on the dropped handle is stale.
    pub fn replace(&mut self) -> ChatResult<SessionGeneration> {
        self.handle = None;
        self.generation = self.generation.next();

        let provider = match self.provider.as_ref() {
            Ok(provider) => provider,
            Err(reason) => {
                return ProviderUnavailableSnafu {
                    stage: "session-replace",
                    reason: reason.clone(),
                }
                .fail();
            }
        };

        let handle = provider
            .create_session(self.config.clone())
            .context(SessionInitSnafu {
                stage: "session-replace",
            })?;

        tracing::info!(
            generation = self.generation.0,
            provider_id = %provider.id(),
            model_id = %self.config.model_id,
            "chat session ready"
        );
        self.handle = Some(handle);
        Ok(self.generation)
    }
}
