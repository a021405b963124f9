//! Message model: immutable id + headers + body.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::headers;

/// Header name -> header value. Ordered only so metadata files are stable.
pub type Headers = BTreeMap<String, String>;

/// Stable string identifier of a message type (e.g. `sales.order.place.v1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Classification supplied by the conventions collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Command,
    Event,
    /// Neither a command nor an event (replies, control messages, ...).
    Message,
}

/// How an outgoing message was addressed. Written to the intent header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendIntent {
    Send,
    SendLocal,
    Publish,
}

impl SendIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            SendIntent::Send => "Send",
            SendIntent::SendLocal => "SendLocal",
            SendIntent::Publish => "Publish",
        }
    }
}

/// A message claimed from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    message_id: String,
    headers: Headers,
    body: Vec<u8>,
}

impl IncomingMessage {
    pub fn new(message_id: impl Into<String>, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            message_id: message_id.into(),
            headers,
            body,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.header(headers::MESSAGE_TYPE).map(MessageType::new)
    }

    pub fn is_control_message(&self) -> bool {
        self.header(headers::CONTROL_MESSAGE)
            .is_some_and(|v| v.eq_ignore_ascii_case(headers::TRUE))
    }
}

/// A message on its way out. Headers stay mutable until it is enlisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    message_id: String,
    headers: Headers,
    body: Vec<u8>,
}

impl OutgoingMessage {
    pub fn new(message_id: impl Into<String>, mut headers: Headers, body: Vec<u8>) -> Self {
        let message_id = message_id.into();
        headers
            .entry(headers::MESSAGE_ID.to_string())
            .or_insert_with(|| message_id.clone());
        Self {
            message_id,
            headers,
            body,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.header(headers::MESSAGE_TYPE).map(MessageType::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_message_stamps_its_id_header() {
        let msg = OutgoingMessage::new("msg-1", Headers::new(), Vec::new());
        assert_eq!(msg.header(headers::MESSAGE_ID), Some("msg-1"));
    }

    #[test]
    fn control_marker_is_case_insensitive() {
        let mut h = Headers::new();
        h.insert(headers::CONTROL_MESSAGE.to_string(), "True".to_string());
        let msg = IncomingMessage::new("msg-1", h, Vec::new());
        assert!(msg.is_control_message());
    }

    #[test]
    fn message_type_reads_header() {
        let mut h = Headers::new();
        h.insert(headers::MESSAGE_TYPE.to_string(), "sales.order.v1".to_string());
        let msg = IncomingMessage::new("msg-1", h, Vec::new());
        assert_eq!(msg.message_type(), Some(MessageType::new("sales.order.v1")));
    }
}
