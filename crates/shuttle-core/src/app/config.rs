//! EndpointConfig - JSON で渡すエンドポイント設定
//!
//! 省略したフィールドは既定値になります。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Address;
use crate::error::ConfigError;
use crate::recoverability::{DelayedConfig, ImmediateConfig, RecoverabilityConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub endpoint_name: String,
    pub storage_root: PathBuf,
    #[serde(default)]
    pub instance_discriminator: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_queue")]
    pub error_queue: String,
    #[serde(default)]
    pub recoverability: RecoverabilitySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecoverabilitySettings {
    #[serde(default)]
    pub immediate: ImmediateSettings,
    #[serde(default)]
    pub delayed: DelayedSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImmediateSettings {
    #[serde(default = "default_immediate_retries")]
    pub max_retries: i32,
}

impl Default for ImmediateSettings {
    fn default() -> Self {
        Self {
            max_retries: default_immediate_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayedSettings {
    #[serde(default = "default_delayed_retries")]
    pub max_retries: i32,
    #[serde(default = "default_time_increase_secs")]
    pub time_increase_secs: i64,
}

impl Default for DelayedSettings {
    fn default() -> Self {
        Self {
            max_retries: default_delayed_retries(),
            time_increase_secs: default_time_increase_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_error_queue() -> String {
    "error".to_string()
}

fn default_immediate_retries() -> i32 {
    5
}

fn default_delayed_retries() -> i32 {
    3
}

fn default_time_increase_secs() -> i64 {
    10
}

impl EndpointConfig {
    pub fn new(endpoint_name: impl Into<String>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            storage_root: storage_root.into(),
            instance_discriminator: None,
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            error_queue: default_error_queue(),
            recoverability: RecoverabilitySettings::default(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EndpointConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_name.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint_name", "must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        if !self.input_address().is_single_segment() {
            return Err(ConfigError::invalid("endpoint_name", "must be usable as a directory name"));
        }
        if let Some(address) = self.instance_address()
            && !address.is_single_segment()
        {
            return Err(ConfigError::invalid("instance_discriminator", "must be usable as a directory name"));
        }
        if !self.error_address().is_single_segment() {
            return Err(ConfigError::invalid("error_queue", "must be usable as a directory name"));
        }
        self.recoverability()?;
        Ok(())
    }

    pub fn recoverability(&self) -> Result<RecoverabilityConfig, ConfigError> {
        let delayed = &self.recoverability.delayed;
        let time_increase = chrono::Duration::try_seconds(delayed.time_increase_secs)
            .ok_or_else(|| ConfigError::invalid("delayed.time_increase_secs", "out of range"))?;
        Ok(RecoverabilityConfig {
            immediate: ImmediateConfig::new(self.recoverability.immediate.max_retries)?,
            delayed: DelayedConfig::new(delayed.max_retries, time_increase)?,
        })
    }

    /// Shared queue of the endpoint.
    pub fn input_address(&self) -> Address {
        Address::new(self.endpoint_name.clone())
    }

    /// Instance-specific queue, when a discriminator is configured.
    pub fn instance_address(&self) -> Option<Address> {
        self.instance_discriminator
            .as_ref()
            .map(|d| Address::new(format!("{}-{d}", self.endpoint_name)))
    }

    pub fn error_address(&self) -> Address {
        Address::new(self.error_queue.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn minimal_json_gets_defaults() {
        let config = EndpointConfig::from_json_str(r#"{"endpoint_name":"sales","storage_root":"/tmp/q"}"#).unwrap();

        assert_eq!(config, EndpointConfig::new("sales", "/tmp/q"));
        let recoverability = config.recoverability().unwrap();
        assert_eq!(recoverability.immediate.max_retries(), 5);
        assert_eq!(recoverability.delayed.max_retries(), 3);
        assert_eq!(recoverability.delayed.time_increase(), chrono::Duration::seconds(10));
    }

    #[test]
    fn instance_queue_uses_discriminator() {
        let mut config = EndpointConfig::new("sales", "/tmp/q");
        assert_eq!(config.instance_address(), None);

        config.instance_discriminator = Some("blue".to_string());
        assert_eq!(config.instance_address(), Some(Address::new("sales-blue")));
    }

    #[rstest]
    #[case(r#"{"endpoint_name":"","storage_root":"/q"}"#)]
    #[case(r#"{"endpoint_name":"sales","storage_root":"/q","concurrency":0}"#)]
    #[case(r#"{"endpoint_name":"a/b","storage_root":"/q"}"#)]
    #[case(r#"{"endpoint_name":"sales","storage_root":"/q","error_queue":".."}"#)]
    #[case(r#"{"endpoint_name":"sales","storage_root":"/q","recoverability":{"delayed":{"max_retries":-1}}}"#)]
    #[case(r#"{"endpoint_name":"sales","storage_root":"/q","recoverability":{"delayed":{"time_increase_secs":-10}}}"#)]
    #[case(r#"{"endpoint_name":"sales","storage_root":"/q","recoverability":{"immediate":{"max_retries":-2}}}"#)]
    fn invalid_values_are_rejected(#[case] raw: &str) {
        let err = EndpointConfig::from_json_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "{err}");
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = EndpointConfig::from_json_str(r#"{"endpoint_name":"s","storage_root":"/q","colour":1}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
