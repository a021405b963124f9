//! App - アプリケーション層
//!
//! store / pipeline / routing / recoverability を組み合わせて
//! 動くエンドポイントにします。
//!
//! # 主要コンポーネント
//! - **EndpointBuilder**: 構築とワイヤリング（起動時検証）
//! - **Endpoint**: recovery → worker 起動、ハンドラー外からの送信
//! - **MessagePump / WorkerGroup**: claim → pipeline → commit/rollback のループ
//! - **InvokeHandlers**: incoming pipeline の末尾

pub mod builder;
pub mod config;
pub mod endpoint;
pub mod handler;
pub mod pump;

pub use self::builder::EndpointBuilder;
pub use self::config::EndpointConfig;
pub use self::endpoint::Endpoint;
pub use self::handler::InvokeHandlers;
pub use self::pump::WorkerGroup;
