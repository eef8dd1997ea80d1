use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use pumpdesk_llm::{
    ChatSession, LlmProvider, ProviderError, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, SessionConfig, StreamEventMapped, StreamTarget,
    make_event_stream,
};
use tokio::sync::Notify;

use crate::chat::SessionSlot;

#[derive(Clone)]
pub(crate) enum Step {
    Chunk(&'static str),
    /// Parks the worker until the gate is notified.
    Wait(Arc<Notify>),
    Fail(&'static str),
    /// Closes the stream without a terminal event.
    Hangup,
}

#[derive(Default)]
pub(crate) struct ScriptState {
    pub fail_create: AtomicBool,
    pub fail_open: AtomicBool,
    pub sessions_created: AtomicUsize,
    pub requests: ArcSwap<Vec<String>>,
}

impl ScriptState {
    pub fn requests(&self) -> Vec<String> {
        Vec::clone(&self.requests.load())
    }
}

pub(crate) struct ScriptedProvider {
    turns: Vec<Vec<Step>>,
    state: Arc<ScriptState>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Step>) -> (Arc<Self>, Arc<ScriptState>) {
        Self::turns(vec![script])
    }

    /// The n-th request replays the n-th script; the last one repeats.
    pub fn turns(turns: Vec<Vec<Step>>) -> (Arc<Self>, Arc<ScriptState>) {
        let state = Arc::new(ScriptState::default());
        let provider = Arc::new(Self {
            turns,
            state: state.clone(),
        });
        (provider, state)
    }

    pub fn chunks(chunks: &[&'static str]) -> (Arc<Self>, Arc<ScriptState>) {
        Self::new(chunks.iter().copied().map(Step::Chunk).collect())
    }
}

impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn create_session(&self, config: SessionConfig) -> ProviderResult<Box<dyn ChatSession>> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderError::MissingApiKey {
                stage: "scripted-create-session",
                provider_id: self.id().to_string(),
            });
        }

        self.state.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            config,
            turns: self.turns.clone(),
            state: self.state.clone(),
        }))
    }
}

struct ScriptedSession {
    config: SessionConfig,
    turns: Vec<Vec<Step>>,
    state: Arc<ScriptState>,
}

impl ChatSession for ScriptedSession {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn history(&self) -> Vec<ProviderMessage> {
        Vec::new()
    }

    fn send_streaming(
        &self,
        target: StreamTarget,
        text: &str,
    ) -> ProviderResult<ProviderStreamHandle> {
        let text = text.to_string();
        let previous = self.state.requests.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(text.clone());
            next
        });
        let turn = previous.len().min(self.turns.len().saturating_sub(1));

        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(ProviderError::StreamFailed {
                stage: "scripted-open",
                target,
                message: "connection refused".to_string(),
            });
        }

        let (event_tx, stream, cancel_rx) = make_event_stream(target);
        let script = self.turns.get(turn).cloned().unwrap_or_default();
        let worker: ProviderWorker = Box::pin(async move {
            let _cancel_rx = cancel_rx;
            for step in script {
                match step {
                    Step::Chunk(chunk) => {
                        if event_tx.send(StreamEventMapped::delta(target, chunk)).is_err() {
                            return;
                        }
                    }
                    Step::Wait(gate) => gate.notified().await,
                    Step::Fail(message) => {
                        let _ = event_tx.send(StreamEventMapped::error(target, message));
                        return;
                    }
                    Step::Hangup => return,
                }
            }
            let _ = event_tx.send(StreamEventMapped::done(target));
        });

        Ok(ProviderStreamHandle { stream, worker })
    }
}

pub(crate) fn slot_for(provider: Arc<ScriptedProvider>) -> SessionSlot {
    let provider: Arc<dyn LlmProvider> = provider;
    SessionSlot::new(
        Ok(provider),
        SessionConfig::new("scripted-model", "system instruction"),
    )
}
