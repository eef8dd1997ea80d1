use chrono::{DateTime, Utc};

/// Stable identifier for one transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Session epoch. Bumped every time the session handle is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionGeneration(pub u64);

impl SessionGeneration {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Identifier for one user submission.
///
/// This must change on every submit so stale chunks can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stream routing key used for stale-chunk rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnTarget {
    pub generation: SessionGeneration,
    pub turn: TurnId,
}

impl TurnTarget {
    pub const fn new(generation: SessionGeneration, turn: TurnId) -> Self {
        Self { generation, turn }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Bot,
}

/// Whether a message may still grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// Bot placeholder that is still receiving chunks.
    Pending,
    Final,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub is_error: bool,
    pub status: MessageStatus,
}

impl Message {
    fn new(id: MessageId, sender: Sender, text: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id,
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            is_error: false,
            status,
        }
    }

    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Sender::User, text, MessageStatus::Final)
    }

    pub fn bot(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Sender::Bot, text, MessageStatus::Final)
    }

    /// Creates an error-flagged bot message.
    pub fn bot_error(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::bot(id, text)
        }
    }

    /// Creates the empty bot placeholder filled by streamed chunks.
    pub fn bot_placeholder(id: MessageId) -> Self {
        Self::new(id, Sender::Bot, String::new(), MessageStatus::Pending)
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

/// Hands out process-unique message ids.
#[derive(Debug)]
pub struct MessageIdAllocator {
    next: u64,
}

impl MessageIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn alloc(&mut self) -> MessageId {
        let id = MessageId::new(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

impl Default for MessageIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of the single in-flight turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    UserMessageAppended(TurnTarget),
    AwaitingStream(TurnTarget),
    Streaming(TurnTarget),
    Finalized {
        target: TurnTarget,
        outcome: TurnOutcome,
    },
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(String),
    Abandoned,
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransition {
    Begin(TurnTarget),
    OpenStream(TurnTarget),
    FirstChunk(TurnTarget),
    Finish {
        target: TurnTarget,
        outcome: TurnOutcome,
    },
    ResetToIdle,
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransitionRejection {
    TurnInProgress {
        active: TurnTarget,
        attempted: TurnTarget,
    },
    NoActiveTurn,
    TargetMismatch {
        active: TurnTarget,
        attempted: TurnTarget,
    },
    OutOfOrder {
        state: TurnState,
        transition: TurnTransition,
    },
}

pub type TurnTransitionResult = Result<TurnState, TurnTransitionRejection>;

impl TurnState {
    /// Returns the in-flight target, if a turn has begun and not yet finalized.
    pub fn active_target(&self) -> Option<TurnTarget> {
        match self {
            Self::UserMessageAppended(target)
            | Self::AwaitingStream(target)
            | Self::Streaming(target) => Some(*target),
            Self::Idle | Self::Finalized { .. } => None,
        }
    }

    /// True while a turn is in flight; this is the loading flag.
    pub fn is_busy(&self) -> bool {
        self.active_target().is_some()
    }

    /// Returns true when incoming stream data belongs to the in-flight turn.
    pub fn accepts_stream_event(&self, target: TurnTarget) -> bool {
        matches!(
            self,
            Self::AwaitingStream(active) | Self::Streaming(active) if *active == target
        )
    }

    /// Applies one transition deterministically.
    ///
    /// A new turn may only begin from `Idle` or `Finalized`. Every other transition must
    /// name the in-flight target exactly.
    pub fn apply(&self, transition: TurnTransition) -> TurnTransitionResult {
        match transition {
            TurnTransition::Begin(target) => self.apply_begin(target),
            TurnTransition::OpenStream(target) => self.apply_open_stream(target),
            TurnTransition::FirstChunk(target) => self.apply_first_chunk(target),
            TurnTransition::Finish { target, outcome } => self.apply_finish(target, outcome),
            TurnTransition::ResetToIdle => Ok(Self::Idle),
        }
    }

    fn apply_begin(&self, target: TurnTarget) -> TurnTransitionResult {
        match self.active_target() {
            Some(active) => Err(TurnTransitionRejection::TurnInProgress {
                active,
                attempted: target,
            }),
            None => Ok(Self::UserMessageAppended(target)),
        }
    }

    fn apply_open_stream(&self, target: TurnTarget) -> TurnTransitionResult {
        match self {
            Self::UserMessageAppended(active) if *active == target => {
                Ok(Self::AwaitingStream(target))
            }
            _ => self.reject(target, TurnTransition::OpenStream(target)),
        }
    }

    fn apply_first_chunk(&self, target: TurnTarget) -> TurnTransitionResult {
        match self {
            Self::AwaitingStream(active) | Self::Streaming(active) if *active == target => {
                Ok(Self::Streaming(target))
            }
            _ => self.reject(target, TurnTransition::FirstChunk(target)),
        }
    }

    fn apply_finish(&self, target: TurnTarget, outcome: TurnOutcome) -> TurnTransitionResult {
        match self.active_target() {
            Some(active) if active == target => Ok(Self::Finalized { target, outcome }),
            Some(active) => Err(TurnTransitionRejection::TargetMismatch {
                active,
                attempted: target,
            }),
            None => Err(TurnTransitionRejection::NoActiveTurn),
        }
    }

    fn reject(&self, target: TurnTarget, transition: TurnTransition) -> TurnTransitionResult {
        match self.active_target() {
            Some(active) if active != target => Err(TurnTransitionRejection::TargetMismatch {
                active,
                attempted: target,
            }),
            Some(_) => Err(TurnTransitionRejection::OutOfOrder {
                state: self.clone(),
                transition,
            }),
            None => Err(TurnTransitionRejection::NoActiveTurn),
        }
    }
}
