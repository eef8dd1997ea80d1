use std::sync::Arc;

use crate::chat::message::{Message, SessionGeneration, TurnTarget};

/// User intent dispatched from the presentation layer to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Free-form text typed by the user.
    Send(String),
    /// Index into the quick action list.
    QuickAction(usize),
    /// Abandon the in-flight reply, keeping whatever text already arrived.
    Stop,
    Reset,
    Quit,
}

/// Result of a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started(TurnTarget),
    Ignored(IgnoreReason),
}

/// Why a submission was dropped without touching the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyInput,
    TurnInProgress,
    NoSession,
    UnknownQuickAction,
}

impl SubmitOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Render data re-published after every controller mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub generation: SessionGeneration,
    /// Bumped each time the transcript is replaced by a reset.
    pub epoch: u64,
    pub messages: Arc<Vec<Message>>,
    pub loading: bool,
}

impl ChatSnapshot {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// True when the typing indicator should be shown: loading with no reply text yet.
    pub fn awaiting_first_chunk(&self) -> bool {
        self.loading
            && self
                .last_message()
                .is_some_and(|message| message.is_pending() && message.text.is_empty())
    }
}
