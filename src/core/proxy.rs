//! Proxy settings and HTTP client construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::StreamFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    None,
    Custom,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ProxyConfig {
    pub fn none() -> Self {
        Self {
            proxy_type: ProxyType::None,
            address: None,
        }
    }

    pub fn system() -> Self {
        Self {
            proxy_type: ProxyType::System,
            address: None,
        }
    }

    pub fn custom(address: impl Into<String>) -> Self {
        Self {
            proxy_type: ProxyType::Custom,
            address: Some(address.into()),
        }
    }

    /// Proxy URL for a custom proxy. Bare `host:port` addresses are treated
    /// as HTTP proxies.
    pub fn proxy_url(&self) -> Option<String> {
        if self.proxy_type != ProxyType::Custom {
            return None;
        }
        let address = self.address.as_deref()?.trim();
        if address.is_empty() {
            return None;
        }
        if address.contains("://") {
            Some(address.to_string())
        } else {
            Some(format!("http://{address}"))
        }
    }

    pub fn label(&self) -> &'static str {
        match self.proxy_type {
            ProxyType::None => "none",
            ProxyType::Custom => "custom",
            ProxyType::System => "system",
        }
    }
}

/// How a reqwest client is tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProfile {
    /// Default client used for the primary streaming transport.
    Standard,
    /// HTTP/1.1 only, no pooled connections. Used by the fallback transports
    /// for setups where the standard client's connections get broken by the
    /// platform or an intercepting proxy.
    Conservative,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Build a reqwest client honoring the proxy settings.
///
/// [`ProxyType::System`] relies on reqwest's environment proxy detection.
/// `None` and [`ProxyType::None`] disable proxying entirely, including
/// `HTTP_PROXY` and friends. A custom proxy without an address behaves like
/// the system setting.
pub fn build_http_client(
    proxy: Option<&ProxyConfig>,
    profile: ClientProfile,
) -> Result<reqwest::Client, StreamFault> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);

    if profile == ClientProfile::Conservative {
        builder = builder.http1_only().pool_max_idle_per_host(0);
    }

    match proxy {
        None
        | Some(ProxyConfig {
            proxy_type: ProxyType::None,
            ..
        }) => {
            builder = builder.no_proxy();
        }
        Some(proxy) if proxy.proxy_type == ProxyType::Custom => {
            if let Some(url) = proxy.proxy_url() {
                let proxy = reqwest::Proxy::all(&url)
                    .map_err(|err| StreamFault::Setup(format!("invalid proxy {url}: {err}")))?;
                builder = builder.proxy(proxy);
            }
        }
        Some(_) => {}
    }

    builder
        .build()
        .map_err(|err| StreamFault::Setup(err.to_string()))
}
