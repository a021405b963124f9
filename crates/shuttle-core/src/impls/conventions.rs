//! DeclaredConventions - 明示的に宣言された command / event の一覧

use std::collections::HashMap;

use crate::domain::{MessageKind, MessageType};
use crate::ports::MessageConventions;
use crate::typed::Message;

/// Anything not declared is classified as `MessageKind::Message`.
#[derive(Debug, Clone, Default)]
pub struct DeclaredConventions {
    kinds: HashMap<MessageType, MessageKind>,
}

impl DeclaredConventions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, message_type: MessageType, kind: MessageKind) {
        self.kinds.insert(message_type, kind);
    }

    pub fn command<M: Message>(&mut self) {
        self.declare(M::message_type(), MessageKind::Command);
    }

    pub fn event<M: Message>(&mut self) {
        self.declare(M::message_type(), MessageKind::Event);
    }
}

impl MessageConventions for DeclaredConventions {
    fn kind_of(&self, message_type: &MessageType) -> MessageKind {
        self.kinds.get(message_type).copied().unwrap_or(MessageKind::Message)
    }
}
