//! Common utilities and types shared across the application.

pub mod error;
pub mod reconnect;

pub use error::{AppError, ConfigError, ConnectionError, SettingsError};
