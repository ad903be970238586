//! Unified error handling for FLEETSIM
//!
//! One central error type for the whole system so every layer (vehicle
//! dynamics, messaging fabric, configuration) reports failures consistently.

use thiserror::Error;

/// Main error type for FLEETSIM operations
#[derive(Debug, Error)]
pub enum FleetError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport unavailable or misused (not connected, bad endpoint, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The directory refused to register this node
    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    /// A topic was advertised twice on the same client
    #[error("Topic `{0}` is already advertised on this client")]
    DuplicateAdvertisement(String),

    /// Publish on a topic that was never advertised
    #[error("Topic `{0}` is not advertised. Missing former call to advertise_topic()?")]
    TopicNotAdvertised(String),

    /// Message type does not match the advertised type descriptor
    #[error("Type mismatch on topic `{topic}`: got `{got}`, expected `{expected}`")]
    TypeMismatch {
        topic: String,
        got: String,
        expected: String,
    },

    /// The directory knows no such service
    #[error("Service `{0}` not found")]
    ServiceNotFound(String),

    /// A service invocation failed at the transport or handler level
    #[error("Service call failed: {0}")]
    ServiceCallFailed(String),

    /// Vehicle geometry invariant broken (non-positive wheelbase, steering
    /// angle out of range, ...)
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/Deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The transport context is shutting down; blocked receives unwind with
    /// this and the dispatcher treats it as a normal exit
    #[error("Transport context terminated")]
    Terminated,
}

/// Convenience type alias for Results using FleetError
pub type FleetResult<T> = Result<T, FleetError>;

impl From<bincode::Error> for FleetError {
    fn from(err: bincode::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FleetError {
    fn from(err: toml::de::Error) -> Self {
        FleetError::Config(format!("TOML parse error: {}", err))
    }
}

impl FleetError {
    /// Create a transport error with a custom message
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        FleetError::Transport(msg.into())
    }

    /// Create a geometry error with a custom message
    pub fn geometry<S: Into<String>>(msg: S) -> Self {
        FleetError::Geometry(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        FleetError::Config(msg.into())
    }

    /// Check if this error is the distinguished terminating signal
    pub fn is_terminated(&self) -> bool {
        matches!(self, FleetError::Terminated)
    }
}
