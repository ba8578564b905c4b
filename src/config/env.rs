//! Environment Variable Configuration Provider
//!
//! `loop.max_iterations` is read from `TRANSCRIPT_AGENT_LOOP_MAX_ITERATIONS`.

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

pub const ENV_PREFIX: &str = "TRANSCRIPT_AGENT_";

/// Read-only environment variable configuration provider.
///
/// Environment variables are treated as immutable at runtime because
/// modifying them is not thread-safe.
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    prefix: String,
}

impl EnvConfigProvider {
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }

    /// Keys are `section.name`: the first underscore after the prefix marks the section.
    fn key_from_env(&self, env_name: &str) -> Option<String> {
        let rest = env_name.strip_prefix(&self.prefix)?.to_lowercase();
        Some(match rest.split_once('_') {
            Some((section, name)) => format!("{}.{}", section, name),
            None => rest,
        })
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::prefixed(ENV_PREFIX)
    }
}

#[async_trait::async_trait]
impl ConfigProvider for EnvConfigProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        let env_key = self.env_key(key);
        match std::env::var(&env_key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let env_prefix = self.env_key(prefix);
        let keys: Vec<String> = std::env::vars()
            .filter(|(k, _)| k.starts_with(&env_prefix))
            .filter_map(|(k, _)| self.key_from_env(&k))
            .collect();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProviderExt;

    #[test]
    fn test_env_key_conversion() {
        let provider = EnvConfigProvider::default();
        assert_eq!(
            provider.env_key("loop.max_iterations"),
            "TRANSCRIPT_AGENT_LOOP_MAX_ITERATIONS"
        );
        assert_eq!(
            provider
                .key_from_env("TRANSCRIPT_AGENT_EXTRACTION_MAX_RETRIES")
                .as_deref(),
            Some("extraction.max_retries")
        );
        assert!(provider.key_from_env("OTHER_LOOP_MAX").is_none());
    }

    #[tokio::test]
    async fn test_env_provider_get() {
        let provider = EnvConfigProvider::prefixed("TRANSCRIPT_AGENT_TEST_GET_");

        // SAFETY: Test-only environment setup with a prefix unique to this test
        unsafe { std::env::set_var("TRANSCRIPT_AGENT_TEST_GET_LOOP_MAX_ITERATIONS", "7") };
        let value: Option<u32> = provider.get("loop.max_iterations").await.unwrap();
        assert_eq!(value, Some(7));

        let keys = provider.list_keys("loop").await.unwrap();
        assert_eq!(keys, vec!["loop.max_iterations".to_string()]);
        unsafe { std::env::remove_var("TRANSCRIPT_AGENT_TEST_GET_LOOP_MAX_ITERATIONS") };
    }

    #[tokio::test]
    async fn test_env_provider_not_found() {
        let provider = EnvConfigProvider::prefixed("NONEXISTENT_PREFIX_");
        let value = provider.get_raw("some.key").await.unwrap();
        assert_eq!(value, None);
    }
}
