//! Well-known header names.
//!
//! Header values are plain strings; message types are compared as the
//! stable string identifier written at serialization time.

pub const MESSAGE_ID: &str = "Shuttle.MessageId";
pub const MESSAGE_TYPE: &str = "Shuttle.MessageType";
pub const MESSAGE_INTENT: &str = "Shuttle.MessageIntent";
pub const CONVERSATION_ID: &str = "Shuttle.ConversationId";
pub const RELATED_TO: &str = "Shuttle.RelatedTo";
pub const ORIGINATING_ENDPOINT: &str = "Shuttle.OriginatingEndpoint";
pub const TIME_SENT: &str = "Shuttle.TimeSent";

/// Marks infrastructure messages that carry no business payload.
pub const CONTROL_MESSAGE: &str = "Shuttle.ControlMessage";

pub const FAILED_QUEUE: &str = "Shuttle.FailedQ";
pub const EXCEPTION_MESSAGE: &str = "Shuttle.ExceptionInfo.Message";
pub const PROCESSING_ATTEMPTS: &str = "Shuttle.ProcessingAttempts";

/// Correlation id stamped by the external retry tool on a retried message.
pub const RETRY_UNIQUE_MESSAGE_ID: &str = "Shuttle.Retry.UniqueMessageId";

/// Present only when the retry tool understands acknowledgements.
pub const RETRY_TOOL_VERSION: &str = "Shuttle.Retry.ToolVersion";

/// ISO-8601 time at which a retried message was processed successfully.
pub const RETRY_SUCCESSFUL: &str = "Shuttle.Retry.Successful";

pub const RETRY_ACKNOWLEDGEMENT_SENT: &str = "Shuttle.Retry.AcknowledgementSent";

pub const TRUE: &str = "true";
