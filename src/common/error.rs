//! Error types for the application.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Connection-related errors (IRC transport).
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Connection timeout during {stage}")]
    Timeout { stage: &'static str },

    #[error("Registration rejected by server: {reason}")]
    RegistrationFailed { reason: String },

    #[error("No usable nickname after {attempts} attempts (last tried '{nick}')")]
    NickUnavailable { nick: String, attempts: u32 },

    #[error("Line exceeds {limit} bytes without a terminator")]
    LineTooLong { limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings persistence errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Result type alias for settings operations.
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_messages() {
        let err = ConnectionError::NickUnavailable {
            nick: "steve5".to_string(),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "No usable nickname after 5 attempts (last tried 'steve5')"
        );

        let err = ConnectionError::Timeout { stage: "registration" };
        assert_eq!(err.to_string(), "Connection timeout during registration");
    }

    #[test]
    fn test_app_error_wraps_sources() {
        let err: AppError = ConfigError::ValidationError {
            message: "irc.server is required".to_string(),
        }
        .into();
        assert!(err.to_string().contains("irc.server is required"));

        let err: AppError = ConnectionError::ConnectionClosed.into();
        assert!(matches!(err, AppError::Connection(_)));
    }
}
