//! Command-line interface parsing and handling
//!
//! A thin harness over [`ApiService`]: stream one answer, list models, or
//! list providers.

pub mod model_list;
pub mod pick_default_provider;
pub mod provider_list;
pub mod say;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::model_list::list_models;
use crate::cli::pick_default_provider::set_default_provider;
use crate::cli::provider_list::list_providers;
use crate::cli::say::run_say;
use crate::core::config::Config;
use crate::core::providers::{ProviderConfig, ProviderKind};
use crate::core::service::ApiService;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Stream answers from OpenAI, Groq or a local Ollama server")]
#[command(
    long_about = "Parley sends a prompt to a chat provider and streams the answer to stdout \
as it arrives.\n\n\
Configuration is read from the platform config directory (override with --config \
or PARLEY_CONFIG).\n\n\
Environment Variables (used when the config has no key):\n\
  OPENAI_API_KEY    API key for OpenAI\n\
  GROQ_API_KEY      API key for Groq\n\
  RUST_LOG          Log filter (default: parley=info)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Read settings from this file instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Log debug details
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Provider to use (openai, groq, ollama)
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER")]
    pub provider: Option<ProviderKind>,

    /// Model to use instead of the configured one
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt and stream the answer
    Say {
        /// The prompt; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List the models offered by a provider
    Models,
    /// List the supported providers
    Providers,
    /// Remember a provider as the default
    Default {
        /// Provider to use when --provider is omitted
        provider: ProviderKind,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log.as_deref(), args.verbose).map_err(|err| -> Box<dyn Error> { err })?;

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Commands::Default { provider } = args.command {
        return set_default_provider(config, provider, args.config.as_deref());
    }

    let mut service = ApiService::from_config(&config)?;
    apply_env_keys(&mut service);

    if let Some(provider) = args.provider {
        service.set_active_provider(provider);
    }
    if let Some(model) = args.model.as_deref() {
        service.set_current_model(model);
    }

    match args.command {
        Commands::Say { prompt } => run_say(&service, prompt).await,
        Commands::Models => list_models(&mut service).await,
        Commands::Providers => list_providers(&service),
        Commands::Default { .. } => Ok(()),
    }
}

/// Fill in API keys from `<PROVIDER>_API_KEY` for clients that have none.
fn apply_env_keys(service: &mut ApiService) {
    for kind in ProviderKind::ALL {
        if service.client(kind).config().has_api_key() {
            continue;
        }
        let var = format!("{}_API_KEY", kind.as_str().to_ascii_uppercase());
        if let Ok(api_key) = std::env::var(&var) {
            debug!(provider = %kind, %var, "Using API key from environment");
            service.set_model_config(kind, Some(ProviderConfig::new(kind, api_key, "", "")));
        }
    }
}
