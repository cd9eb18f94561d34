use thiserror::Error;

/// Main error type for the logmux service-log multiplexer
#[derive(Debug, Error)]
pub enum LogmuxError {
    // Service discovery errors
    #[error("Failed to list service root: {0}")]
    DiscoveryError(String),

    #[error("Failed to inspect service entry {0}: {1}")]
    StatError(String, String),

    // Log follow errors
    #[error("Failed to start log follower for {0}: {1}")]
    FollowSpawnError(String, String),

    #[error("Log stream error for {0}: {1}")]
    FollowStreamError(String, String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    // Startup errors
    #[error("Service root {0} is not usable: {1}")]
    RootUnusable(String, String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for logmux operations
pub type Result<T> = std::result::Result<T, LogmuxError>;
