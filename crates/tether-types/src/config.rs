use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,

    #[error("stream timeout must be greater than zero")]
    ZeroStreamTimeout,

    #[error("output buffer capacity must be greater than zero")]
    ZeroBufferCapacity,
}

/// Per-session streaming limits, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Period between keep-alive pings
    pub heartbeat_interval: Duration,
    /// Hard deadline for the whole session, measured from its start
    pub stream_timeout: Duration,
    /// Bound of the output channel
    pub buffer_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            stream_timeout: Duration::from_secs(180),
            buffer_capacity: 256,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        if self.stream_timeout.is_zero() {
            return Err(ConfigError::ZeroStreamTimeout);
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        Ok(())
    }
}
