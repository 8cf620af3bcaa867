//! Built-in provider configuration
//!
//! Defaults for every [`ProviderKind`] are embedded from
//! `builtin_providers.toml` at build time.

use serde::{Deserialize, Serialize};

use crate::core::chat_stream::WireProtocol;
use crate::core::providers::ProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinProvider {
    pub id: ProviderKind,
    pub display_name: String,
    pub base_url: String,
    pub default_model: String,
    pub protocol: WireProtocol,
    #[serde(default = "default_requires_api_key")]
    pub requires_api_key: bool,
    #[serde(default)]
    pub max_retries: u32,
}

fn default_requires_api_key() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    /// Endpoint path for chat requests, relative to the API URL.
    pub fn chat_path(&self) -> &'static str {
        match self.protocol {
            WireProtocol::Sse => "chat/completions",
            WireProtocol::Ndjson => "api/chat",
        }
    }

    /// Endpoint path for model listing, relative to the API URL.
    pub fn models_path(&self) -> &'static str {
        match self.protocol {
            WireProtocol::Sse => "models",
            WireProtocol::Ndjson => "api/tags",
        }
    }
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> Vec<BuiltinProvider> {
    const CONFIG_CONTENT: &str = include_str!("builtin_providers.toml");

    let config: BuiltinProvidersConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_providers.toml");

    config.providers
}

/// Defaults for one provider kind.
pub fn builtin_provider(kind: ProviderKind) -> BuiltinProvider {
    load_builtin_providers()
        .into_iter()
        .find(|p| p.id == kind)
        .expect("builtin_providers.toml covers every provider kind")
}
