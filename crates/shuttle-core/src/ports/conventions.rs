//! MessageConventions port - メッセージ種別の分類
//!
//! command / event / その他 の判定は外部の規約に任せます。

use crate::domain::{MessageKind, MessageType};

pub trait MessageConventions: Send + Sync {
    fn kind_of(&self, message_type: &MessageType) -> MessageKind;
}
