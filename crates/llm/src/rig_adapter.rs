use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::{gemini, openai};
use rig::streaming::{StreamedAssistantContent, StreamingCompletionResponse};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::events::{Role, StreamEventMapped, StreamEventPayload, StreamTarget};
use super::model::{SessionConfig, default_model_for};
use super::provider::{
    ChatSession, CompletionsFailedSnafu, EmptyMessageSetSnafu, HttpClientSnafu, LlmProvider,
    MissingApiKeySnafu, MissingModelSnafu, ProviderConfig, ProviderError, ProviderMessage,
    ProviderResult, ProviderStreamHandle, ProviderWorker, StreamRequest,
    UnsupportedProviderSnafu, make_event_stream,
};

pub const RIG_GEMINI_PROVIDER_ID: &str = "gemini";
pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

type SharedHistory = Arc<ArcSwap<Vec<ProviderMessage>>>;

enum RigClient {
    Gemini(gemini::Client),
    OpenAi(openai::Client),
}

pub struct RigProviderAdapter {
    config: ProviderConfig,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<RigClient> {
        match config.provider_id.as_str() {
            RIG_GEMINI_PROVIDER_ID => {
                let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
                if !config.endpoint.is_empty() {
                    builder = builder.base_url(config.endpoint.as_str());
                }
                let client = builder.build().context(HttpClientSnafu {
                    stage: "build-gemini-client",
                })?;
                Ok(RigClient::Gemini(client))
            }
            RIG_OPENAI_PROVIDER_ID => {
                let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
                if !config.endpoint.is_empty() {
                    builder = builder.base_url(config.endpoint.as_str());
                }
                let client = builder.build().context(HttpClientSnafu {
                    stage: "build-openai-client",
                })?;
                Ok(RigClient::OpenAi(client))
            }
            other => UnsupportedProviderSnafu {
                stage: "build-client",
                provider_id: other.to_string(),
            }
            .fail(),
        }
    }

    fn to_rig_message(message: &ProviderMessage) -> RigMessage {
        match message.role {
            Role::User => RigMessage::user(message.content.clone()),
            Role::Assistant => RigMessage::assistant(message.content.clone()),
        }
    }

    async fn open_stream<M>(
        model: M,
        request: &StreamRequest,
    ) -> ProviderResult<StreamingCompletionResponse<M::StreamingResponse>>
    where
        M: CompletionModel,
    {
        let mut messages = request
            .messages
            .iter()
            .map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let Some(prompt) = messages.pop() else {
            tracing::warn!(
                target = ?request.target,
                model_id = %request.model_id,
                "cannot open stream without a prompt message"
            );
            return EmptyMessageSetSnafu {
                stage: "open-stream-pop-prompt",
                target: request.target,
            }
            .fail();
        };
        let mut builder = model.completion_request(prompt).messages(messages);

        if let Some(preamble) = request
            .preamble
            .as_deref()
            .filter(|preamble| !preamble.trim().is_empty())
        {
            builder = builder.preamble(preamble.to_string());
        }

        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        target: StreamTarget,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEventMapped::error(target, error.to_string()));
    }

    fn map_stream_item<R>(
        target: StreamTarget,
        item: StreamedAssistantContent<R>,
    ) -> Option<StreamEventMapped>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) => Some(StreamEventMapped::delta(target, text.text)),
            // Reasoning traces are not part of the visible reply.
            StreamedAssistantContent::Reasoning(_)
            | StreamedAssistantContent::ReasoningDelta { .. }
            | StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => None,
        }
    }

    async fn run_stream_worker<M>(
        model: M,
        request: StreamRequest,
        history: SharedHistory,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) where
        M: CompletionModel + 'static,
    {
        let target = request.target;
        let mut stream = match Self::open_stream(model, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    target = ?target,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, target, error);
                return;
            }
        };

        let mut reply = String::new();
        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    tracing::debug!(target = ?target, "provider stream cancelled");
                    stream.cancel();
                    break;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            let Some(mapped) = Self::map_stream_item(target, item) else {
                                continue;
                            };
                            if let StreamEventPayload::Delta(text) = &mapped.payload {
                                reply.push_str(text);
                            }
                            if event_tx.send(mapped).is_err() {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(
                                target = ?target,
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, target, error);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if cancelled || stream_failed {
            return;
        }

        if let Some(prompt) = request
            .messages
            .iter()
            .rev()
            .find(|message| matches!(message.role, Role::User))
        {
            record_exchange(&history, prompt.clone(), reply);
        }

        let _ = event_tx.send(StreamEventMapped::done(target));
    }
}

/// Appends one completed user/assistant exchange to the session history.
fn record_exchange(history: &SharedHistory, prompt: ProviderMessage, reply: String) {
    let answer = ProviderMessage::new(Role::Assistant, reply);
    history.rcu(|current| {
        let mut next = Vec::clone(current);
        next.push(prompt.clone());
        next.push(answer.clone());
        next
    });
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        match self.config.provider_id.as_str() {
            RIG_OPENAI_PROVIDER_ID => "Rig OpenAI",
            _ => "Rig Gemini",
        }
    }

    fn default_model(&self) -> &str {
        default_model_for(&self.config.provider_id)
    }

    fn create_session(&self, config: SessionConfig) -> ProviderResult<Box<dyn ChatSession>> {
        ensure!(
            !config.model_id.is_empty(),
            MissingModelSnafu {
                stage: "create-session",
            }
        );

        let client = Self::build_client(&self.config)?;
        tracing::info!(
            provider_id = %self.config.provider_id,
            model_id = %config.model_id,
            "created chat session"
        );

        Ok(Box::new(RigChatSession {
            client,
            config,
            history: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }))
    }
}

/// Chat session over a stateless Rig client; history is kept locally.
pub struct RigChatSession {
    client: RigClient,
    config: SessionConfig,
    history: SharedHistory,
}

impl ChatSession for RigChatSession {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn history(&self) -> Vec<ProviderMessage> {
        Vec::clone(&self.history.load())
    }

    fn send_streaming(
        &self,
        target: StreamTarget,
        text: &str,
    ) -> ProviderResult<ProviderStreamHandle> {
        let mut messages = self.history();
        messages.push(ProviderMessage::new(Role::User, text));
        let request = StreamRequest::for_session(target, &self.config, messages);

        let (event_tx, stream, cancel_rx) = make_event_stream(target);
        let history = self.history.clone();
        let model_id = request.model_id.clone();

        let worker: ProviderWorker = match &self.client {
            RigClient::Gemini(client) => Box::pin(RigProviderAdapter::run_stream_worker(
                client.completion_model(model_id),
                request,
                history,
                event_tx,
                cancel_rx,
            )),
            RigClient::OpenAi(client) => Box::pin(RigProviderAdapter::run_stream_worker(
                client.completion_model(model_id),
                request,
                history,
                event_tx,
                cancel_rx,
            )),
        };

        Ok(ProviderStreamHandle { stream, worker })
    }
}
