use pumpdesk_llm::ProviderError;
use snafu::Snafu;

use super::message::MessageId;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display(
        "transcript invariant violation on `{stage}`: message {attempted:?} cannot follow pending reply {pending:?}"
    ))]
    InvariantViolation {
        stage: &'static str,
        pending: MessageId,
        attempted: MessageId,
    },
    #[snafu(display("failed to initialize chat session on `{stage}`: {source}"))]
    SessionInit {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("no model provider is configured: {reason}"))]
    ProviderUnavailable { stage: &'static str, reason: String },
    #[snafu(display("chat stream failed on `{stage}`: {message}"))]
    Stream {
        stage: &'static str,
        message: String,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;
