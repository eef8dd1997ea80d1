use std::sync::Arc;

use super::error::{ChatResult, InvariantViolationSnafu};
use super::message::{Message, MessageId, MessageStatus};

/// Ordered transcript with copy-on-write snapshots.
///
/// Entries are only ever appended. `reset` is the single operation that discards
/// history, and it replaces the sequence wholesale.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    messages: Arc<Vec<Message>>,
    epoch: u64,
}

impl TranscriptStore {
    pub fn new(seed: Message) -> Self {
        Self {
            messages: Arc::new(vec![seed]),
            epoch: 0,
        }
    }

    /// Number of times the transcript was replaced by `reset`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Immutable view shared with the presentation layer.
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.messages)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The pending placeholder, which is always the last entry when present.
    pub fn pending(&self) -> Option<&Message> {
        self.messages.last().filter(|message| message.is_pending())
    }

    pub fn append(&mut self, message: Message) -> ChatResult<()> {
        // Nothing may land behind the reply that is still streaming.
        if let Some(pending) = self.pending() {
            return InvariantViolationSnafu {
                stage: "transcript-append",
                pending: pending.id,
                attempted: message.id,
            }
            .fail();
        }

        Arc::make_mut(&mut self.messages).push(message);
        Ok(())
    }

    /// Replaces the text of a pending message.
    ///
    /// Unknown ids and finalized messages are left untouched; this is how updates from a
    /// turn that outlived a reset are discarded. Returns whether anything changed.
    pub fn update_by_id(&mut self, id: MessageId, text: &str) -> bool {
        let Some(index) = self.pending_index(id) else {
            return false;
        };

        let message = &mut Arc::make_mut(&mut self.messages)[index];
        message.text.clear();
        message.text.push_str(text);
        true
    }

    /// Marks a pending message final. Returns whether anything changed.
    pub fn finalize_by_id(&mut self, id: MessageId) -> bool {
        let Some(index) = self.pending_index(id) else {
            return false;
        };

        Arc::make_mut(&mut self.messages)[index].status = MessageStatus::Final;
        true
    }

    pub fn reset(&mut self, seed: Message) {
        self.messages = Arc::new(vec![seed]);
        self.epoch = self.epoch.saturating_add(1);
    }

    fn pending_index(&self, id: MessageId) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.id == id && message.is_pending())
    }
}
