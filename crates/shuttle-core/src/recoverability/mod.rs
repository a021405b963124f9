//! Recoverability - 失敗したメッセージの扱い
//!
//! - immediate retry: pump が rollback してもう一度 claim させる
//! - 上限を超えたら error queue に転送（同じトランザクション内）
//! - 外部 retry ツールへの acknowledgement

pub mod config;
pub mod forwarding;
pub mod manual_retry;

pub use self::config::{DelayedConfig, ImmediateConfig, RecoverabilityConfig};
pub use self::forwarding::{FailureInfoStorage, forward_to_error_queue};
pub use self::manual_retry::{
    ForwardingToErrorQueue, ManualRetryAcknowledgement, MarkAsAcknowledged, RetryAcknowledgementState,
};
