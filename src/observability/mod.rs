//! Logging setup.
//!
//! The library only emits `tracing` events and spans; it never installs a
//! subscriber on its own. Applications that want the default console output
//! can enable the `tracing-init` feature:
//!
//! ```toml
//! transcript-agent = { version = "0.1", features = ["tracing-init"] }
//! ```
//!
//! ```rust,ignore
//! use transcript_agent::observability::{TracingConfig, TracingLevel, init_tracing};
//!
//! init_tracing(&TracingConfig::new().level(TracingLevel::Debug))?;
//! ```

/// Tracing configuration.
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    pub service_name: Option<String>,
    pub enabled: bool,
    pub level: TracingLevel,
    /// Include event targets in console output
    pub with_target: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingLevel {
    #[default]
    Info,
    Debug,
    Trace,
}

impl TracingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self {
            enabled: true,
            with_target: true,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> String {
        format!("transcript_agent={}", self.level.as_str())
    }
}

/// Installs a console subscriber honouring `RUST_LOG`, falling back to the
/// configured level for this crate. A disabled config installs nothing.
#[cfg(feature = "tracing-init")]
#[cfg_attr(docsrs, doc(cfg(feature = "tracing-init")))]
pub fn init_tracing(config: &TracingConfig) -> crate::Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if !config.enabled {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("failed to install tracing subscriber: {}", e)))?;

    tracing::debug!(service = ?config.service_name, "Tracing initialized");
    Ok(())
}
