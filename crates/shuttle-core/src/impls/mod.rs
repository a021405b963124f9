//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **TracingEventSink / NoopEventSink / RecordingEventSink**: EventSink
//! - **InMemorySubscriptions**: プロセス内の SubscriptionStore
//! - **DeclaredConventions**: 宣言ベースの MessageConventions

pub mod conventions;
pub mod event_sinks;
pub mod subscriptions;

pub use self::conventions::DeclaredConventions;
pub use self::event_sinks::{NoopEventSink, RecordingEventSink, TracingEventSink};
pub use self::subscriptions::InMemorySubscriptions;
