//! Typed - 型付き Message API
//!
//! message type の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Message` trait, `Handler<M>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod message;
pub mod registry;

pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::message::Message;
pub use self::registry::{RegistryError, TypedRegistry};
