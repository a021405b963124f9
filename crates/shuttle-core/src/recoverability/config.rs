//! Retry settings.
//!
//! Immediate retries are executed by the pump. Delayed retries are kept
//! as configuration data only; nothing schedules them.

use chrono::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmediateConfig {
    max_retries: u32,
}

impl ImmediateConfig {
    pub fn new(max_retries: i32) -> Result<Self, ConfigError> {
        let max_retries =
            u32::try_from(max_retries).map_err(|_| ConfigError::invalid("immediate.max_retries", "must not be negative"))?;
        Ok(Self { max_retries })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for ImmediateConfig {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedConfig {
    max_retries: u32,
    time_increase: Duration,
}

impl DelayedConfig {
    pub fn new(max_retries: i32, time_increase: Duration) -> Result<Self, ConfigError> {
        let max_retries =
            u32::try_from(max_retries).map_err(|_| ConfigError::invalid("delayed.max_retries", "must not be negative"))?;
        if time_increase < Duration::zero() {
            return Err(ConfigError::invalid("delayed.time_increase", "must not be negative"));
        }
        Ok(Self {
            max_retries,
            time_increase,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn time_increase(&self) -> Duration {
        self.time_increase
    }

    /// Delay before delayed retry `round` (1-based); `None` past the limit.
    pub fn delay_for(&self, round: u32) -> Option<Duration> {
        if round == 0 || round > self.max_retries {
            return None;
        }
        self.time_increase.checked_mul(i32::try_from(round).ok()?)
    }
}

impl Default for DelayedConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            time_increase: Duration::seconds(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverabilityConfig {
    pub immediate: ImmediateConfig,
    pub delayed: DelayedConfig,
}
