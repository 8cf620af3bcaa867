use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::builtin_providers::builtin_provider;
use crate::core::orchestrator::{FallbackPolicy, StreamPolicy};
use crate::core::providers::{ProviderConfig, ProviderKind};
use crate::core::proxy::ProxyConfig;
use crate::core::timeout::MAX_TIMEOUT;

/// Per-provider overrides. Unset fields fall back to the built-in defaults.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Retries after a failed stream attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackPolicy>,
    /// Platforms where `fallback = "auto"` enables the fallback transports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_platforms: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_provider: Option<ProviderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// Keyed by provider id ("openai", "groq", "ollama")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, ProviderSettings>,
    #[serde(default)]
    pub stream: StreamSettings,
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn provider_settings(&self, kind: ProviderKind) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(kind.as_str()))
            .map(|(_, settings)| settings)
    }

    pub fn provider_settings_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        self.providers.entry(kind.as_str().to_string()).or_default()
    }

    /// The settings for `kind` as an update for
    /// [`ProviderClient::set_model_config`](crate::core::client::ProviderClient::set_model_config),
    /// or `None` when the file has nothing for that provider.
    pub fn provider_config(&self, kind: ProviderKind) -> Option<ProviderConfig> {
        let settings = self.provider_settings(kind)?;
        Some(ProviderConfig {
            provider: kind,
            api_key: settings.api_key.clone().unwrap_or_default(),
            api_url: settings.api_url.clone().unwrap_or_default(),
            model: settings.model.clone().unwrap_or_default(),
        })
    }

    /// Stream policy for `kind`: built-in defaults overlaid with the file's
    /// stream and provider settings. Timeouts of zero are ignored and longer
    /// ones than [`MAX_TIMEOUT`] are capped.
    pub fn stream_policy(&self, kind: ProviderKind) -> StreamPolicy {
        let mut policy = StreamPolicy {
            max_retries: builtin_provider(kind).max_retries,
            ..StreamPolicy::default()
        };

        if let Some(secs) = self.stream.request_timeout_secs.filter(|secs| *secs > 0) {
            policy.request_timeout = Duration::from_secs(secs).min(MAX_TIMEOUT);
        }
        if let Some(secs) = self.stream.stall_timeout_secs.filter(|secs| *secs > 0) {
            policy.stall_timeout = Duration::from_secs(secs).min(MAX_TIMEOUT);
        }
        if let Some(fallback) = self.stream.fallback {
            policy.fallback = fallback;
        }
        if let Some(platforms) = &self.stream.fallback_platforms {
            policy.fallback_platforms = platforms.clone();
        }
        if let Some(max_retries) = self.provider_settings(kind).and_then(|s| s.max_retries) {
            policy.max_retries = max_retries;
        }
        policy
    }
}
