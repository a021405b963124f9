//! Domain model (IDs, messages, headers, events, errors).

pub mod address;
pub mod errors;
pub mod events;
pub mod headers;
pub mod ids;
pub mod message;

pub use address::Address;
pub use errors::StoreError;
pub use events::TransportEvent;
pub use ids::{MessageId, ParseIdError, TransactionId};
pub use message::{Headers, IncomingMessage, MessageKind, MessageType, OutgoingMessage, SendIntent};
