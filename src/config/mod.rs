//! Configuration sources for the engine.
//!
//! ```rust,no_run
//! use transcript_agent::agent::EngineConfig;
//! use transcript_agent::config::EnvConfigProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(&EnvConfigProvider::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod memory;
pub mod provider;

pub use env::{ENV_PREFIX, EnvConfigProvider};
pub use memory::MemoryConfigProvider;
pub use provider::{ConfigProvider, ConfigProviderExt};

use thiserror::Error;

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
