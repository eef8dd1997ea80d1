pub mod controller;
pub mod error;
/// Event contracts between the presentation layer and the controller.
pub mod events;
/// Domain entities and the turn state machine.
pub mod message;
pub mod session;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::ChatController;
pub use error::{ChatError, ChatResult};
pub use events::{ChatCommand, ChatSnapshot, IgnoreReason, SubmitOutcome};
pub use message::{
    Message, MessageId, MessageIdAllocator, MessageStatus, Sender, SessionGeneration, TurnId,
    TurnOutcome, TurnState, TurnTarget, TurnTransition, TurnTransitionRejection,
    TurnTransitionResult,
};
pub use session::SessionSlot;
pub use transcript::TranscriptStore;
