//! shuttle-core
//!
//! ディレクトリベースのローカル transactional queue と、その上で動く
//! メッセージエンドポイントの部品。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, headers, message, address, errors, events）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, EventSink, TransactionContext, など）
//! - **store**: queue ディレクトリ、LocalTransaction、RecoverySweeper
//! - **pipeline**: behavior chain、step の順序解決、fork
//! - **routing**: route table、endpoint instance、distribution strategy
//! - **recoverability**: retry 設定、error queue 転送、manual retry acknowledgement
//! - **typed**: 型付き Message API（Message trait, Handler trait, TypedRegistry）
//! - **app**: EndpointBuilder / Endpoint / message pump
//! - **impls**: 実装（TracingEventSink, InMemorySubscriptions など）

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod pipeline;
pub mod ports;
pub mod recoverability;
pub mod routing;
pub mod store;
pub mod typed;

#[cfg(test)]
mod testing;

pub use app::{Endpoint, EndpointBuilder, EndpointConfig, WorkerGroup};
pub use domain::{Address, IncomingMessage, OutgoingMessage, SendIntent};
pub use error::{BuildError, ConfigError, PipelineError};
pub use store::{QueueStore, RecoveryReport, RecoverySweeper};
pub use typed::{Handler, Message};
