use super::data::{Config, ProviderSettings, StreamSettings};
use super::io::ConfigError;
use crate::core::orchestrator::{FallbackPolicy, DEFAULT_STALL_TIMEOUT};
use crate::core::providers::ProviderKind;
use crate::core::proxy::ProxyConfig;
use crate::core::timeout::MAX_TIMEOUT;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
}

#[test]
fn test_config_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        active_provider: Some(ProviderKind::Groq),
        proxy: Some(ProxyConfig::custom("127.0.0.1:7890")),
        stream: StreamSettings {
            stall_timeout_secs: Some(45),
            fallback: Some(FallbackPolicy::Always),
            ..Default::default()
        },
        ..Default::default()
    };
    *config.provider_settings_mut(ProviderKind::Groq) = ProviderSettings {
        api_key: Some("gsk-test".to_string()),
        model: Some("llama-3.3-70b-versatile".to_string()),
        max_retries: Some(2),
        ..Default::default()
    };

    config.save_to_path(&config_path).expect("save failed");
    let loaded = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(loaded, config);
}

#[test]
fn test_parse_hand_written_file() {
    let config: Config = toml::from_str(
        r#"
active_provider = "ollama"

[proxy]
type = "none"

[providers.ollama]
api_url = "http://127.0.0.1:11434"
model = "mistral:7b"

[stream]
request_timeout_secs = 120
fallback = "never"
"#,
    )
    .expect("parse failed");

    assert_eq!(config.active_provider, Some(ProviderKind::Ollama));
    assert_eq!(config.proxy, Some(ProxyConfig::none()));

    let provider = config
        .provider_config(ProviderKind::Ollama)
        .expect("ollama settings");
    assert_eq!(provider.api_url, "http://127.0.0.1:11434");
    assert_eq!(provider.model, "mistral:7b");
    assert!(provider.api_key.is_empty());
    assert!(config.provider_config(ProviderKind::OpenAi).is_none());

    let policy = config.stream_policy(ProviderKind::Ollama);
    assert_eq!(policy.request_timeout, Duration::from_secs(120));
    assert_eq!(policy.stall_timeout, DEFAULT_STALL_TIMEOUT);
    assert_eq!(policy.fallback, FallbackPolicy::Never);
    assert_eq!(policy.max_retries, 0);
}

#[test]
fn test_provider_retry_budget_overrides_builtin() {
    let mut config = Config::default();
    config.provider_settings_mut(ProviderKind::OpenAi).max_retries = Some(3);

    assert_eq!(config.stream_policy(ProviderKind::OpenAi).max_retries, 3);
    assert_eq!(config.stream_policy(ProviderKind::Groq).max_retries, 0);
}

#[test]
fn test_zero_timeouts_keep_defaults() {
    let config = Config {
        stream: StreamSettings {
            stall_timeout_secs: Some(0),
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(
        config.stream_policy(ProviderKind::Groq).stall_timeout,
        DEFAULT_STALL_TIMEOUT
    );
}

#[test]
fn test_huge_timeouts_are_capped() {
    let config: Config = toml::from_str(
        "[stream]\nrequest_timeout_secs = 9223372036854775807\nstall_timeout_secs = 604800\n",
    )
    .expect("parse");
    let policy = config.stream_policy(ProviderKind::OpenAi);
    assert_eq!(policy.request_timeout, MAX_TIMEOUT);
    assert_eq!(policy.stall_timeout, MAX_TIMEOUT);
}

#[test]
fn test_invalid_toml_is_a_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "active_provider = [").expect("write failed");

    let err = Config::load_from_path(&config_path).expect_err("should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn test_unknown_provider_is_a_parse_error() {
    let result = toml::from_str::<Config>(r#"active_provider = "anthropic""#);
    assert!(result.is_err());
}
