//! Runtime configuration.
//!
//! Settings come from the environment first and are then overridden by an
//! optional JSON config file, so a checked-in file can pin everything except
//! secrets.
use crate::platform::PlatformSettings;
use crate::provider::{DEFAULT_INFERENCE_PROVIDER, DEFAULT_MODEL, DEFAULT_PROVIDER_URL};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const ENV_HF_TOKEN: &str = "HF_TOKEN";
pub const ENV_ENDPOINT: &str = "CAPSULE_ENDPOINT";
pub const ENV_PROJECT_ID: &str = "CAPSULE_PROJECT_ID";
pub const ENV_FUNCTION_ID: &str = "CAPSULE_FUNCTION_ID";
pub const ENV_API_KEY: &str = "CAPSULE_API_KEY";
pub const ENV_PROVIDER_URL: &str = "CAPSULE_PROVIDER_URL";
pub const ENV_ACTION_URL: &str = "CAPSULE_ACTION_URL";

const DEFAULT_REALTIME_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapsuleConfig {
    pub endpoint: Option<String>,
    pub project_id: Option<String>,
    pub function_id: Option<String>,
    pub api_key: Option<String>,
    pub hf_token: Option<String>,
    pub provider_url: String,
    pub model: String,
    pub inference_provider: Option<String>,
    /// Page URL hosting the form action; unset means run the action in-process.
    pub action_url: Option<String>,
    pub realtime_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            project_id: None,
            function_id: None,
            api_key: None,
            hf_token: None,
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            inference_provider: Some(DEFAULT_INFERENCE_PROVIDER.to_string()),
            action_url: None,
            realtime_timeout_secs: DEFAULT_REALTIME_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Sparse file overrides; present fields replace the env-derived values.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    endpoint: Option<String>,
    project_id: Option<String>,
    function_id: Option<String>,
    api_key: Option<String>,
    hf_token: Option<String>,
    provider_url: Option<String>,
    model: Option<String>,
    inference_provider: Option<String>,
    action_url: Option<String>,
    realtime_timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl CapsuleConfig {
    pub fn realtime_timeout(&self) -> Duration {
        Duration::from_secs(self.realtime_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn platform(&self) -> Result<PlatformSettings> {
        Ok(PlatformSettings {
            endpoint: require(&self.endpoint, ENV_ENDPOINT)?,
            project_id: require(&self.project_id, ENV_PROJECT_ID)?,
            api_key: self.api_key.clone(),
        })
    }

    pub fn function_id(&self) -> Result<String> {
        require(&self.function_id, ENV_FUNCTION_ID)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        fn replace<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        fn replace_opt<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        replace_opt(&mut self.endpoint, file.endpoint);
        replace_opt(&mut self.project_id, file.project_id);
        replace_opt(&mut self.function_id, file.function_id);
        replace_opt(&mut self.api_key, file.api_key);
        replace_opt(&mut self.hf_token, file.hf_token);
        replace(&mut self.provider_url, file.provider_url);
        replace(&mut self.model, file.model);
        replace_opt(&mut self.inference_provider, file.inference_provider);
        replace_opt(&mut self.action_url, file.action_url);
        replace(&mut self.realtime_timeout_secs, file.realtime_timeout_secs);
        replace(&mut self.poll_interval_ms, file.poll_interval_ms);
    }
}

fn require(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{name} is not set (env or config file)"))
}

/// Build a config from environment lookups over the defaults.
pub fn config_from_env(lookup: impl Fn(&str) -> Option<String>) -> CapsuleConfig {
    let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    let mut config = CapsuleConfig {
        endpoint: get(ENV_ENDPOINT),
        project_id: get(ENV_PROJECT_ID),
        function_id: get(ENV_FUNCTION_ID),
        api_key: get(ENV_API_KEY),
        hf_token: get(ENV_HF_TOKEN),
        action_url: get(ENV_ACTION_URL),
        ..CapsuleConfig::default()
    };
    if let Some(url) = get(ENV_PROVIDER_URL) {
        config.provider_url = url;
    }
    config
}

/// Load the environment, then layer `path` on top when given.
pub fn load_config(path: Option<&Path>) -> Result<CapsuleConfig> {
    let mut config = config_from_env(|name| std::env::var(name).ok());
    if let Some(path) = path {
        let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
        let file: ConfigFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config JSON {}", path.display()))?;
        config.apply_file(file);
    }
    validate_config(&config)?;
    Ok(config)
}

/// Reject settings no command could work with.
pub fn validate_config(config: &CapsuleConfig) -> Result<()> {
    if config.provider_url.trim().is_empty() {
        return Err(anyhow!("provider_url must be non-empty"));
    }
    if config.model.trim().is_empty() {
        return Err(anyhow!("model must be non-empty"));
    }
    if config.realtime_timeout_secs == 0 {
        return Err(anyhow!("realtime_timeout_secs must be at least 1"));
    }
    if config.poll_interval_ms == 0 {
        return Err(anyhow!("poll_interval_ms must be at least 1"));
    }
    for (name, value) in [
        ("endpoint", &config.endpoint),
        ("action_url", &config.action_url),
    ] {
        if let Some(url) = value {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!("{name} must be an http(s) URL (got {url:?})"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
