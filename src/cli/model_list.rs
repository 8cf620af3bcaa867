//! Model listing functionality

use std::error::Error;

use crate::core::builtin_providers::builtin_provider;
use crate::core::service::ApiService;

pub async fn list_models(service: &mut ApiService) -> Result<(), Box<dyn Error>> {
    let kind = service.active_provider();
    let display_name = builtin_provider(kind).display_name;
    let current_model = service.client(kind).config().model.clone();

    println!("🤖 Available Models for {display_name}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("🎯 Current model: {current_model}");
    println!();

    let models = match service.fetch_available_models(Some(kind)).await {
        Ok(models) => models,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    if models.is_empty() {
        println!("No models found for this provider.");
        return Ok(());
    }

    println!("Found {} models (sorted newest first):", models.len());
    println!();
    for model in models {
        let marker = if model.id == current_model { " (current)" } else { "" };
        println!("  • {}{marker}", model.name);
    }
    Ok(())
}
