//! One chat client, parameterized by provider kind.
//!
//! The provider's [`WireProtocol`] picks the endpoint paths and the frame
//! decoder; everything else (proxying, timeouts, retries, fallbacks, error
//! translation) is shared.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::models::fetch_models;
use crate::api::{ChatRequest, CompletionResponse, OllamaChatResponse};
use crate::core::builtin_providers::{builtin_provider, BuiltinProvider};
use crate::core::chat_stream::WireProtocol;
use crate::core::errors::{ApiError, StreamFault};
use crate::core::message::{format_messages, ChatMessage};
use crate::core::orchestrator::{StreamOrchestrator, StreamPolicy};
use crate::core::providers::{ModelInfo, ProviderConfig, ProviderKind};
use crate::core::proxy::{build_http_client, ClientProfile, ProxyConfig};
use crate::core::transport::{
    ensure_success, BufferedHttpTransport, HttpStreamTransport, StreamRequest, TransportChain,
};
use crate::utils::url::construct_api_url;

pub struct ProviderClient {
    kind: ProviderKind,
    builtin: BuiltinProvider,
    config: ProviderConfig,
    proxy: Option<ProxyConfig>,
    policy: StreamPolicy,
    http: reqwest::Client,
    transports: TransportChain,
    /// Transports supplied by the caller survive proxy changes.
    injected_transports: bool,
    cached_models: Vec<ModelInfo>,
}

/// The standard client plus the streaming chain built over it: the primary
/// streaming transport, then the conservative streaming client, then the
/// buffered legacy client.
fn build_transports(
    proxy: Option<&ProxyConfig>,
) -> Result<(reqwest::Client, TransportChain), StreamFault> {
    let standard = build_http_client(proxy, ClientProfile::Standard)?;
    let conservative = build_http_client(proxy, ClientProfile::Conservative)?;

    let chain = TransportChain::new(Arc::new(HttpStreamTransport::new(
        "streaming",
        standard.clone(),
    )))
    .with_fallback(Arc::new(HttpStreamTransport::new(
        "alternate",
        conservative.clone(),
    )))
    .with_fallback(Arc::new(BufferedHttpTransport::new("buffered", conservative)));

    Ok((standard, chain))
}

impl ProviderClient {
    pub fn new(kind: ProviderKind) -> Result<Self, ApiError> {
        let proxy = ProxyConfig::system();
        let (http, transports) =
            build_transports(Some(&proxy)).map_err(|fault| Self::surface(kind, &fault))?;
        Ok(Self::assemble(kind, http, transports, false))
    }

    /// A client whose streaming calls go through `transports` instead of the
    /// built-in HTTP chain. Non-streaming calls and model listing still use
    /// HTTP.
    pub fn with_transports(
        kind: ProviderKind,
        transports: TransportChain,
    ) -> Result<Self, ApiError> {
        let http = build_http_client(Some(&ProxyConfig::system()), ClientProfile::Standard)
            .map_err(|fault| Self::surface(kind, &fault))?;
        Ok(Self::assemble(kind, http, transports, true))
    }

    fn assemble(
        kind: ProviderKind,
        http: reqwest::Client,
        transports: TransportChain,
        injected_transports: bool,
    ) -> Self {
        let builtin = builtin_provider(kind);
        let policy = StreamPolicy {
            max_retries: builtin.max_retries,
            ..StreamPolicy::default()
        };
        Self {
            kind,
            config: ProviderConfig::defaults(kind),
            builtin,
            proxy: Some(ProxyConfig::system()),
            policy,
            http,
            transports,
            injected_transports,
            cached_models: Vec::new(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn stream_policy(&self) -> &StreamPolicy {
        &self.policy
    }

    pub fn set_stream_policy(&mut self, policy: StreamPolicy) {
        self.policy = policy;
    }

    pub fn set_retry_budget(&mut self, max_retries: u32) {
        self.policy.max_retries = max_retries;
    }

    /// Models from the last successful listing.
    pub fn cached_models(&self) -> &[ModelInfo] {
        &self.cached_models
    }

    /// Replace the proxy settings and rebuild the HTTP clients. `None`
    /// clears proxying. An invalid proxy leaves the previous settings and
    /// clients in place.
    pub fn set_proxy_config(&mut self, proxy: Option<ProxyConfig>) -> Result<(), ApiError> {
        let result = if self.injected_transports {
            build_http_client(proxy.as_ref(), ClientProfile::Standard)
                .map(|http| (http, self.transports.clone()))
        } else {
            build_transports(proxy.as_ref())
        };

        let (http, transports) = result.map_err(|fault| {
            warn!(provider = %self.kind, %fault, "Rejected proxy configuration");
            Self::surface(self.kind, &fault)
        })?;

        debug!(
            provider = %self.kind,
            proxy = proxy.as_ref().map_or("none", ProxyConfig::label),
            "Rebuilt HTTP clients"
        );
        self.http = http;
        self.transports = transports;
        self.proxy = proxy;
        Ok(())
    }

    /// Apply connection overrides. `None` keeps the current settings, and so
    /// do blank fields of an update.
    pub fn set_model_config(&mut self, update: Option<ProviderConfig>) {
        let Some(update) = update else {
            return;
        };
        if update.provider != self.kind {
            debug!(
                provider = %self.kind,
                update_provider = %update.provider,
                "Applying settings addressed to another provider kind"
            );
        }
        self.config.merge(&update);
    }

    pub fn set_current_model(&mut self, model: &str) {
        let model = model.trim();
        if !model.is_empty() {
            self.config.model = model.to_string();
        }
    }

    fn require_api_key(&self) -> Result<(), StreamFault> {
        if self.builtin.requires_api_key && !self.config.has_api_key() {
            return Err(StreamFault::MissingApiKey);
        }
        Ok(())
    }

    fn stream_request(&self, text: &str, history: &[ChatMessage], stream: bool) -> StreamRequest {
        let api_key = match self.builtin.protocol {
            WireProtocol::Sse if self.config.has_api_key() => Some(self.config.api_key.clone()),
            _ => None,
        };
        StreamRequest {
            endpoint: construct_api_url(&self.config.api_url, self.builtin.chat_path()),
            api_key,
            payload: ChatRequest {
                model: self.config.model.clone(),
                messages: format_messages(history, text),
                stream,
            },
            protocol: self.builtin.protocol,
        }
    }

    fn surface(kind: ProviderKind, fault: &StreamFault) -> ApiError {
        ApiError::from_fault(fault, kind)
    }

    /// Non-streaming call: one request, full answer.
    pub async fn send_message(
        &self,
        text: &str,
        history: &[ChatMessage],
    ) -> Result<String, ApiError> {
        self.complete(text, history).await.map_err(|fault| {
            warn!(
                provider = %self.kind,
                model = %self.config.model,
                %fault,
                "Chat request failed"
            );
            Self::surface(self.kind, &fault)
        })
    }

    async fn complete(&self, text: &str, history: &[ChatMessage]) -> Result<String, StreamFault> {
        self.require_api_key()?;
        let request = self.stream_request(text, history, false);
        debug!(provider = %self.kind, endpoint = %request.endpoint, "Sending chat request");

        let mut http_request = self
            .http
            .post(&request.endpoint)
            .header("Content-Type", "application/json")
            .timeout(self.policy.request_timeout)
            .json(&request.payload);
        if let Some(api_key) = &request.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|err| StreamFault::from_reqwest(&err))?;
        let response = ensure_success(response).await?;
        let body = response
            .text()
            .await
            .map_err(|err| StreamFault::from_reqwest(&err))?;

        let content = parse_completion(self.builtin.protocol, &body)?;
        if content.trim().is_empty() {
            return Err(StreamFault::EmptyResponse);
        }
        Ok(content)
    }

    /// Streaming call. `on_chunk` receives every non-blank delta in order
    /// and is never called after this returns.
    pub async fn stream_message<F>(
        &self,
        text: &str,
        history: &[ChatMessage],
        mut on_chunk: F,
    ) -> Result<String, ApiError>
    where
        F: FnMut(&str) + Send,
    {
        if let Err(fault) = self.require_api_key() {
            warn!(provider = %self.kind, "Streaming refused: API key is not set");
            return Err(Self::surface(self.kind, &fault));
        }

        let request = self.stream_request(text, history, true);
        info!(
            provider = %self.kind,
            platform = std::env::consts::OS,
            api_url = %self.config.api_url,
            model = %self.config.model,
            proxy = self.proxy.as_ref().map_or("none", ProxyConfig::label),
            history = history.len(),
            max_retries = self.policy.max_retries,
            "Streaming chat request"
        );

        StreamOrchestrator::new(&self.transports, &self.policy)
            .run(&request, &mut on_chunk)
            .await
            .map_err(|fault| {
                warn!(
                    provider = %self.kind,
                    model = %self.config.model,
                    %fault,
                    "Streaming failed"
                );
                Self::surface(self.kind, &fault)
            })
    }

    /// List the provider's models and cache them.
    pub async fn fetch_available_models(&mut self) -> Result<Vec<ModelInfo>, ApiError> {
        match fetch_models(&self.http, &self.builtin, &self.config).await {
            Ok(models) => {
                debug!(provider = %self.kind, count = models.len(), "Fetched model list");
                self.cached_models = models.clone();
                Ok(models)
            }
            Err(fault) => {
                warn!(provider = %self.kind, %fault, "Model listing failed");
                Err(ApiError::model_listing(&fault, self.kind))
            }
        }
    }
}

fn parse_completion(protocol: WireProtocol, body: &str) -> Result<String, StreamFault> {
    match protocol {
        WireProtocol::Sse => {
            let response: CompletionResponse =
                serde_json::from_str(body).map_err(|err| StreamFault::Parse(err.to_string()))?;
            Ok(response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default())
        }
        WireProtocol::Ndjson => {
            let response: OllamaChatResponse =
                serde_json::from_str(body).map_err(|err| StreamFault::Parse(err.to_string()))?;
            if let Some(error) = response.error {
                return Err(StreamFault::Provider(error));
            }
            Ok(response
                .message
                .map(|message| message.content)
                .unwrap_or_default())
        }
    }
}
