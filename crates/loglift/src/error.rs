//! 💀 Errors: the taxonomy of things going wrong, sorted by who has to care.
//!
//! 🧠 Knowledge graph:
//! - `ConfigurationError`: fatal. Surfaced to whoever asked (factory build, first client use,
//!   template registration). If you see one of these, the config file owes you an apology.
//! - `TransportError`: recoverable. Caught by the completion handler and turned into a redirect.
//!   Producers never see it. Producers are blissfully unaware. Producers are living their best life.
//! - `FailoverError`: the failover policy's own bad day. Logged, counted, and the loop moves on.
//!
//! Application-level failure (the cluster answered, but said "no") is NOT an error here.
//! It's a `BulkResponse` with `succeeded == false`. Rejection is data, not an exception. 🦆

use thiserror::Error;

/// 🔧 Configuration went sideways. Fatal, loud, and raised to the caller that triggered it.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No serverUris provided")]
    NoServers,

    #[error("Invalid server uri '{entry}': {reason}")]
    InvalidServer { entry: String, reason: String },

    #[error("Invalid setting '{name}': {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Client could not be created: {0}")]
    ClientConstruction(String),

    #[error("IndexTemplate not added: {0}")]
    TemplateNotAdded(String),

    #[error("IndexTemplate source unreadable: {0}")]
    TemplateSource(String),
}

/// 📡 The wire let us down. Every variant here ends in a redirect, never in a producer's lap.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("No endpoint accepted a connection: {0}")]
    Connect(String),

    #[error("Frame codec error: {0}")]
    Codec(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// 🛟 The failover policy could not take an item. The redirector shrugs, logs, and keeps going.
#[derive(Error, Debug)]
pub enum FailoverError {
    #[error("Failover storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Failover capacity exceeded: {used} + {incoming} > {max} bytes")]
    CapacityExceeded { used: u64, incoming: u64, max: u64 },

    #[error("Failover serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// ⏱️ True when the failure smells like a timeout, regardless of which layer noticed first.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout(_) => true,
            TransportError::Http(err) => err.is_timeout(),
            TransportError::Io(err) => err.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_template_errors_keep_the_legacy_wording() {
        let err = ConfigurationError::TemplateNotAdded("mapping explosion".to_string());
        assert_eq!(err.to_string(), "IndexTemplate not added: mapping explosion");
    }

    #[test]
    fn the_one_where_timeouts_are_recognized_in_every_costume() {
        assert!(TransportError::Timeout(500).is_timeout());
        let io_timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(TransportError::Io(io_timeout).is_timeout());
        assert!(!TransportError::Protocol("garbled".to_string()).is_timeout());
    }
}
