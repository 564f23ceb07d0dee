use crate::config::ConfigError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No run is being watched")]
    NotSubscribed,
}

/// Failures reported by a subscription transport. Delivered to consumers as the
/// terminal "no further updates" signal, never raised from the pure functions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Received an undecodable frame: {0}")]
    Protocol(String),

    #[error("Connection lost: {0}")]
    Disconnected(String),
}
