use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, MonitError>;

/// The Error type for monitoring operations.
#[derive(Error, Debug)]
pub enum MonitError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidationError(String),

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("HTTP error: {source}")]
    HttpError {
        #[from]
        source: reqwest::Error,
    },

    #[error("Telemetry error for '{workflow}': {reason}")]
    TelemetryError { workflow: String, reason: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Ticket store error: {0}")]
    TicketError(String),

    #[error("Queueing system error: {0}")]
    QueueError(String),

    #[error("Serialization/Deserialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("YAML error: {source}")]
    YamlError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

// lapin errors are mapped to a string variant where they occur; keeping the
// conversion here so `?` works at the publish call sites.
impl From<lapin::Error> for MonitError {
    fn from(err: lapin::Error) -> Self {
        MonitError::QueueError(err.to_string())
    }
}
