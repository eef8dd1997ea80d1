use std::sync::Arc;

mod events;
mod model;
mod provider;
mod rig_adapter;

pub use events::{Role, StreamEventMapped, StreamEventPayload, StreamTarget};
pub use model::{
    DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, DEFAULT_TEMPERATURE, SessionConfig,
    default_model_for,
};
pub use provider::{
    ChatSession, LlmProvider, ProviderConfig, ProviderError, ProviderEventStream,
    ProviderMessage, ProviderResult, ProviderStreamHandle, ProviderWorker, StreamRequest,
    make_event_stream,
};
pub use rig_adapter::{
    RIG_GEMINI_PROVIDER_ID, RIG_OPENAI_PROVIDER_ID, RigChatSession, RigProviderAdapter,
};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        "openai" | "rig-openai" => {
            config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}
