/// Routing key attached to every event of one streamed turn.
///
/// `session` identifies the session epoch that opened the stream and `turn` the
/// submission inside it; callers compare both before applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamTarget {
    pub session: u64,
    pub turn: u64,
}

impl StreamTarget {
    pub const fn new(session: u64, turn: u64) -> Self {
        Self { session, turn }
    }
}

/// Chat speaker role as seen by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// Provider-agnostic stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    /// One text increment. May be empty; consumers skip empty deltas.
    Delta(String),
    Done,
    Error(String),
}

/// One event emitted by a provider stream worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventMapped {
    pub target: StreamTarget,
    pub payload: StreamEventPayload,
}

impl StreamEventMapped {
    pub fn delta(target: StreamTarget, text: impl Into<String>) -> Self {
        Self {
            target,
            payload: StreamEventPayload::Delta(text.into()),
        }
    }

    pub fn done(target: StreamTarget) -> Self {
        Self {
            target,
            payload: StreamEventPayload::Done,
        }
    }

    pub fn error(target: StreamTarget, message: impl Into<String>) -> Self {
        Self {
            target,
            payload: StreamEventPayload::Error(message.into()),
        }
    }
}
