use thiserror::Error;

const DEFAULT_BUFFER_CAPACITY: usize = 64;
const DEFAULT_TRANSPORT_CAPACITY: usize = 64;

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Update buffer capacity must be at least 1")]
    ZeroBufferCapacity,

    #[error("Transport buffer capacity must be at least 1")]
    ZeroTransportCapacity,
}

/// Configuration for an [`EventStreamClient`](crate::stream::EventStreamClient)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Number of undelivered updates buffered between the stream task and the consumer
    pub buffer_capacity: usize,
    /// Number of undelivered transport events buffered between the transport and the stream task
    pub transport_capacity: usize,
}

impl StreamConfig {
    /// Create a new config with validation
    pub fn try_new(buffer_capacity: usize, transport_capacity: usize) -> Result<Self, ConfigError> {
        if buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        if transport_capacity == 0 {
            return Err(ConfigError::ZeroTransportCapacity);
        }

        Ok(Self {
            buffer_capacity,
            transport_capacity,
        })
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            transport_capacity: DEFAULT_TRANSPORT_CAPACITY,
        }
    }
}
