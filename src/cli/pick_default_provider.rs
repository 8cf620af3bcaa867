//! Persist the provider used when `--provider` is omitted.

use std::error::Error;
use std::path::Path;

use crate::core::config::Config;
use crate::core::providers::ProviderKind;

/// Store `provider` as the active one. Writes to `config_path` when given,
/// otherwise to the default config location.
pub fn set_default_provider(
    mut config: Config,
    provider: ProviderKind,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    config.active_provider = Some(provider);
    match config_path {
        Some(path) => config.save_to_path(path)?,
        None => config.save()?,
    }

    println!("✅ Set default provider to: {provider}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_provider_is_written_and_other_settings_kept() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        let mut config = Config::default();
        config.stream.stall_timeout_secs = Some(45);

        set_default_provider(config, ProviderKind::Ollama, Some(&config_path))
            .expect("save default provider");

        let reloaded = Config::load_from_path(&config_path).expect("reload");
        assert_eq!(reloaded.active_provider, Some(ProviderKind::Ollama));
        assert_eq!(reloaded.stream.stall_timeout_secs, Some(45));
    }
}
