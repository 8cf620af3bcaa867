use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::builtin_providers::builtin_provider;
use crate::utils::url::normalize_api_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "ollama")]
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Groq,
        ProviderKind::Ollama,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Groq => "groq",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Providers served from the user's own machine.
    pub fn is_local(self) -> bool {
        self == ProviderKind::Ollama
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProviderError {
    pub input: String,
}

impl fmt::Display for UnknownProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown provider: {}. Expected one of: openai, groq, ollama",
            self.input
        )
    }
}

impl std::error::Error for UnknownProviderError {}

impl FromStr for ProviderKind {
    type Err = UnknownProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownProviderError {
                input: s.to_string(),
            })
    }
}

/// Connection settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

impl ProviderConfig {
    pub fn new(
        provider: ProviderKind,
        api_key: impl Into<String>,
        api_url: &str,
        model: impl Into<String>,
    ) -> Self {
        let mut config = Self::defaults(provider);
        config.merge(&ProviderConfig {
            provider,
            api_key: api_key.into(),
            api_url: api_url.to_string(),
            model: model.into(),
        });
        config
    }

    pub fn defaults(provider: ProviderKind) -> Self {
        let builtin = builtin_provider(provider);
        Self {
            provider,
            api_key: String::new(),
            api_url: builtin.base_url,
            model: builtin.default_model,
        }
    }

    /// Apply an update on top of the current settings. Blank fields in the
    /// update keep the current value, so a partial update never erases a
    /// working configuration.
    pub fn merge(&mut self, update: &ProviderConfig) {
        let api_url = normalize_api_url(&update.api_url);
        if !api_url.is_empty() {
            self.api_url = api_url;
        }
        if !update.api_key.trim().is_empty() {
            self.api_key = update.api_key.trim().to_string();
        }
        if !update.model.trim().is_empty() {
            self.model = update.model.trim().to_string();
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}
