//! Errors - pipeline / 構築 / 設定のエラー型
//!
//! store と routing のエラーはそれぞれのモジュールにあり、
//! `PipelineError` はそれらを `#[from]` で包みます。

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{MessageType, StoreError};
use crate::routing::RoutingError;
use crate::typed::RegistryError;

/// Failure while a message travels through a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("handler failed: {0}")]
    Handler(String),

    #[error("no handler registered for message type '{0}'")]
    NoHandler(MessageType),

    #[error("message {0} has no message type header")]
    MissingMessageType(String),

    #[error("failed to decode body: {0}")]
    Decode(String),

    #[error("failed to encode body: {0}")]
    Encode(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("processing was cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn handler(message: impl std::fmt::Display) -> Self {
        PipelineError::Handler(message.to_string())
    }
}

/// Startup-time wiring failure. Returned by the pipeline and endpoint
/// builders before anything is consumed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("pipeline step '{0}' is registered twice")]
    DuplicateStep(String),

    #[error("pipeline step '{step}' refers to unknown step '{reference}'")]
    UnknownStep { step: String, reference: String },

    #[error("pipeline steps {0:?} form an ordering cycle")]
    OrderingCycle(Vec<String>),

    #[error("step '{before}' must run before '{after}' but is placed in a later stage")]
    ConflictingStage { before: String, after: String },

    #[error("Missing message types: {0:?}. These messages were expected but no handler is registered.")]
    MissingMessageTypes(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
