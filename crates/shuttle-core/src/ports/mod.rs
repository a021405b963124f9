//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。store / pipeline / routing は
//! これらの trait にだけ依存します。

pub mod clock;
pub mod conventions;
pub mod event_sink;
pub mod id_generator;
pub mod subscription_store;
pub mod transaction;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::conventions::MessageConventions;
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::subscription_store::{SubscriptionError, SubscriptionStore};
pub use self::transaction::TransactionContext;
