use std::cmp::Ordering;
use std::time::Duration;

use tracing::debug;

use crate::api::{ModelsResponse, OllamaTag, OllamaTagsResponse, RemoteModel};
use crate::core::builtin_providers::BuiltinProvider;
use crate::core::chat_stream::WireProtocol;
use crate::core::errors::StreamFault;
use crate::core::providers::{ModelInfo, ProviderConfig};
use crate::core::transport::ensure_success;
use crate::utils::url::construct_api_url;

const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Query the provider's model listing endpoint.
///
/// OpenAI-compatible providers answer `GET {api_url}/models` with
/// `data[].id`; Ollama answers `GET {api_url}/api/tags` with `models[].name`.
pub async fn fetch_models(
    client: &reqwest::Client,
    provider: &BuiltinProvider,
    config: &ProviderConfig,
) -> Result<Vec<ModelInfo>, StreamFault> {
    if provider.requires_api_key && !config.has_api_key() {
        return Err(StreamFault::MissingApiKey);
    }

    let models_url = construct_api_url(&config.api_url, provider.models_path());
    debug!(provider = %provider.id, url = %models_url, "Fetching model list");

    let mut request = client
        .get(&models_url)
        .header("Content-Type", "application/json")
        .timeout(LIST_TIMEOUT);
    if config.has_api_key() {
        request = request.bearer_auth(&config.api_key);
    }

    let response = request
        .send()
        .await
        .map_err(|err| StreamFault::from_reqwest(&err))?;
    let response = ensure_success(response).await?;
    let body = response
        .text()
        .await
        .map_err(|err| StreamFault::from_reqwest(&err))?;

    parse_model_list(provider.protocol, &body)
}

/// Decode a listing body into [`ModelInfo`] entries, newest first.
pub fn parse_model_list(protocol: WireProtocol, body: &str) -> Result<Vec<ModelInfo>, StreamFault> {
    match protocol {
        WireProtocol::Sse => {
            let mut response: ModelsResponse =
                serde_json::from_str(body).map_err(|err| StreamFault::Parse(err.to_string()))?;
            sort_models(&mut response.data);
            Ok(response
                .data
                .into_iter()
                .map(|model| ModelInfo {
                    name: model.id.clone(),
                    id: model.id,
                })
                .collect())
        }
        WireProtocol::Ndjson => {
            let mut response: OllamaTagsResponse =
                serde_json::from_str(body).map_err(|err| StreamFault::Parse(err.to_string()))?;
            sort_tags(&mut response.models);
            Ok(response
                .models
                .into_iter()
                .map(|tag| ModelInfo {
                    id: tag.name.clone(),
                    name: tag.name,
                })
                .collect())
        }
    }
}

pub fn sort_models(models: &mut [RemoteModel]) {
    // Newest first; models without a creation date go last, ordered by id.
    models.sort_by(|a, b| match (a.created, b.created) {
        (Some(a_created), Some(b_created)) => {
            b_created.cmp(&a_created).then_with(|| a.id.cmp(&b.id))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}

fn sort_tags(tags: &mut [OllamaTag]) {
    // `modified_at` is RFC 3339, so string order is time order.
    tags.sort_by(|a, b| match (&a.modified_at, &b.modified_at) {
        (Some(a_modified), Some(b_modified)) => b_modified
            .cmp(a_modified)
            .then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
}
