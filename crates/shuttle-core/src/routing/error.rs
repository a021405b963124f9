use thiserror::Error;

use crate::domain::{Address, MessageKind, MessageType, SendIntent};
use crate::ports::SubscriptionError;

/// Configuration problem found while resolving destinations.
///
/// Raised before anything is enlisted.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no destination configured for message type '{0}'")]
    NoRoute(MessageType),

    #[error("message type '{message_type}' has {count} destinations; a send needs exactly one")]
    AmbiguousRoute { message_type: MessageType, count: usize },

    #[error("{intent:?} is not allowed for {kind:?} '{message_type}'")]
    InvalidIntent {
        intent: SendIntent,
        kind: MessageKind,
        message_type: MessageType,
    },

    #[error("outgoing message {0} has no message type header")]
    MissingMessageType(String),

    #[error("endpoint '{0}' has no instances")]
    NoInstances(String),

    #[error("distribution strategy for '{endpoint}' matched none of {candidates:?}")]
    NoMatchingInstance {
        endpoint: String,
        candidates: Vec<Address>,
    },

    #[error(transparent)]
    Subscriptions(#[from] SubscriptionError),
}
