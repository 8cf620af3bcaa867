//! The consumer-facing facade: one client per provider kind and the
//! currently active provider.

use tracing::{info, warn};

use crate::core::client::ProviderClient;
use crate::core::config::Config;
use crate::core::errors::ApiError;
use crate::core::message::ChatMessage;
use crate::core::providers::{ModelInfo, ProviderConfig, ProviderKind};
use crate::core::proxy::ProxyConfig;

pub struct ApiService {
    openai: ProviderClient,
    groq: ProviderClient,
    ollama: ProviderClient,
    active: ProviderKind,
}

impl ApiService {
    /// Every provider with its built-in defaults; OpenAI is active.
    pub fn new() -> Result<Self, ApiError> {
        Ok(Self::with_clients(
            ProviderClient::new(ProviderKind::OpenAi)?,
            ProviderClient::new(ProviderKind::Groq)?,
            ProviderClient::new(ProviderKind::Ollama)?,
        ))
    }

    pub fn with_clients(
        openai: ProviderClient,
        groq: ProviderClient,
        ollama: ProviderClient,
    ) -> Self {
        Self {
            openai,
            groq,
            ollama,
            active: ProviderKind::OpenAi,
        }
    }

    /// Build a service from a loaded config file.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let mut service = Self::new()?;
        if config.proxy.is_some() {
            service.set_proxy_config(config.proxy.clone())?;
        }
        for kind in ProviderKind::ALL {
            let client = service.client_mut(kind);
            client.set_model_config(config.provider_config(kind));
            client.set_stream_policy(config.stream_policy(kind));
        }
        if let Some(active) = config.active_provider {
            service.set_active_provider(active);
        }
        Ok(service)
    }

    pub fn client(&self, kind: ProviderKind) -> &ProviderClient {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Groq => &self.groq,
            ProviderKind::Ollama => &self.ollama,
        }
    }

    pub fn client_mut(&mut self, kind: ProviderKind) -> &mut ProviderClient {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Groq => &mut self.groq,
            ProviderKind::Ollama => &mut self.ollama,
        }
    }

    fn active_client(&self) -> &ProviderClient {
        self.client(self.active)
    }

    pub fn set_active_provider(&mut self, kind: ProviderKind) {
        info!(provider = %kind, "Active provider set");
        self.active = kind;
    }

    pub fn active_provider(&self) -> ProviderKind {
        self.active
    }

    /// Apply proxy settings to every client. Either all clients accept the
    /// settings or none change.
    pub fn set_proxy_config(&mut self, proxy: Option<ProxyConfig>) -> Result<(), ApiError> {
        let previous: Vec<Option<ProxyConfig>> = ProviderKind::ALL
            .into_iter()
            .map(|kind| self.client(kind).proxy().cloned())
            .collect();

        for kind in ProviderKind::ALL {
            if let Err(err) = self.client_mut(kind).set_proxy_config(proxy.clone()) {
                warn!(provider = %kind, "Proxy rejected; restoring previous settings");
                for (restore, old) in ProviderKind::ALL.into_iter().zip(previous) {
                    if restore == kind {
                        break;
                    }
                    // Previous settings were valid when applied.
                    let _ = self.client_mut(restore).set_proxy_config(old);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn set_model_config(&mut self, kind: ProviderKind, config: Option<ProviderConfig>) {
        self.client_mut(kind).set_model_config(config);
    }

    /// Change the model of the active provider.
    pub fn set_current_model(&mut self, model: &str) {
        self.client_mut(self.active).set_current_model(model);
    }

    pub async fn send_message(
        &self,
        text: &str,
        history: &[ChatMessage],
    ) -> Result<String, ApiError> {
        self.active_client().send_message(text, history).await
    }

    pub async fn stream_message<F>(
        &self,
        text: &str,
        history: &[ChatMessage],
        on_chunk: F,
    ) -> Result<String, ApiError>
    where
        F: FnMut(&str) + Send,
    {
        self.active_client()
            .stream_message(text, history, on_chunk)
            .await
    }

    /// List models of `kind`, or of the active provider.
    pub async fn fetch_available_models(
        &mut self,
        kind: Option<ProviderKind>,
    ) -> Result<Vec<ModelInfo>, ApiError> {
        let kind = kind.unwrap_or(self.active);
        self.client_mut(kind).fetch_available_models().await
    }

    pub fn cached_models(&self, kind: ProviderKind) -> &[ModelInfo] {
        self.client(kind).cached_models()
    }
}
