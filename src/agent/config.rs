//! Engine configuration types.
//!
//! Domain-separated configuration: extraction retries, loop safety limits
//! and collaborator timeouts.

use std::time::Duration;

use crate::config::{ConfigError, ConfigProvider, ConfigProviderExt, ConfigResult};

pub const KEY_MAX_RETRIES: &str = "extraction.max_retries";
pub const KEY_ENFORCE_POLICY: &str = "extraction.enforce_policy";
pub const KEY_MAX_ITERATIONS: &str = "loop.max_iterations";
pub const KEY_MAX_TURNS_PER_PASS: &str = "loop.max_turns_per_pass";
pub const KEY_STEP_TIMEOUT_SECS: &str = "timeout.step_secs";
pub const KEY_EXECUTOR_TIMEOUT_SECS: &str = "timeout.executor_secs";
pub const KEY_PASS_TIMEOUT_SECS: &str = "timeout.pass_secs";

/// Extraction-retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Extra proposal rounds after the first candidate fails validation
    pub max_retries: u32,
    /// Whether policy violations trigger retries or are only logged
    pub enforce_policy: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            enforce_policy: true,
        }
    }
}

impl ExtractionConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_enforce_policy(mut self, enforce: bool) -> Self {
        self.enforce_policy = enforce;
        self
    }
}

/// Autonomous loop safety limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Passes before the loop gives up as exhausted
    pub max_iterations: u32,
    /// Model steps allowed inside a single pass
    pub max_turns_per_pass: u32,
    /// Wall-clock limit for one pass
    pub pass_timeout: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_turns_per_pass: 25,
            pass_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl LoopConfig {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_turns_per_pass(mut self, max: u32) -> Self {
        self.max_turns_per_pass = max;
        self
    }

    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = Some(timeout);
        self
    }

    pub fn without_pass_timeout(mut self) -> Self {
        self.pass_timeout = None;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub extraction: ExtractionConfig,
    pub looping: LoopConfig,
    /// Limit for a single model-step call
    pub step_timeout: Option<Duration>,
    /// Limit for a single executor call
    pub executor_timeout: Option<Duration>,
    /// Replaces the default transcript instructions
    pub instructions: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            looping: LoopConfig::default(),
            step_timeout: Some(Duration::from_secs(60)),
            executor_timeout: Some(Duration::from_secs(120)),
            instructions: None,
        }
    }
}

impl EngineConfig {
    pub fn with_extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn with_loop(mut self, looping: LoopConfig) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn with_executor_timeout(mut self, timeout: Duration) -> Self {
        self.executor_timeout = Some(timeout);
        self
    }

    pub fn without_timeouts(mut self) -> Self {
        self.step_timeout = None;
        self.executor_timeout = None;
        self.looping.pass_timeout = None;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Overlays any keys the provider defines on top of the defaults.
    pub async fn load(provider: &dyn ConfigProvider) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(v) = provider.get::<u32>(KEY_MAX_RETRIES).await? {
            config.extraction.max_retries = v;
        }
        if let Some(v) = provider.get::<bool>(KEY_ENFORCE_POLICY).await? {
            config.extraction.enforce_policy = v;
        }
        if let Some(v) = provider.get::<u32>(KEY_MAX_ITERATIONS).await? {
            config.looping.max_iterations = positive(KEY_MAX_ITERATIONS, v)?;
        }
        if let Some(v) = provider.get::<u32>(KEY_MAX_TURNS_PER_PASS).await? {
            config.looping.max_turns_per_pass = positive(KEY_MAX_TURNS_PER_PASS, v)?;
        }
        if let Some(v) = provider.get::<u64>(KEY_STEP_TIMEOUT_SECS).await? {
            config.step_timeout = Some(Duration::from_secs(positive(KEY_STEP_TIMEOUT_SECS, v)?));
        }
        if let Some(v) = provider.get::<u64>(KEY_EXECUTOR_TIMEOUT_SECS).await? {
            config.executor_timeout =
                Some(Duration::from_secs(positive(KEY_EXECUTOR_TIMEOUT_SECS, v)?));
        }
        if let Some(v) = provider.get::<u64>(KEY_PASS_TIMEOUT_SECS).await? {
            config.looping.pass_timeout =
                Some(Duration::from_secs(positive(KEY_PASS_TIMEOUT_SECS, v)?));
        }

        tracing::debug!(
            source = provider.name(),
            max_retries = config.extraction.max_retries,
            max_iterations = config.looping.max_iterations,
            "Loaded engine configuration"
        );
        Ok(config)
    }
}

fn positive<T: PartialEq + Default>(key: &str, value: T) -> ConfigResult<T> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
