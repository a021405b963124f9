//! TypedRegistry - Handler の登録と管理
//!
//! message type 文字列 → `Arc<dyn DynHandler>`。1 つの型に登録できる
//! handler は 1 つだけです。

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::message::Message;

/// TypedRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<PlaceOrder, _>(PlaceOrderHandler)?;
///
/// let handler = registry.get("sales.order.place.v1");
/// ```
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for message type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Message, H: Handler<M> + 'static>(&mut self, handler: H) -> Result<(), RegistryError> {
        let message_type = M::TYPE.to_string();
        if self.handlers.contains_key(&message_type) {
            return Err(RegistryError::AlreadyRegistered(message_type));
        }
        self.handlers
            .insert(message_type, Arc::new(TypedHandler::<M, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, message_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(message_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
