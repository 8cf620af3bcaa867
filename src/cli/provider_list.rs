use std::error::Error;

use crate::core::builtin_providers::load_builtin_providers;
use crate::core::service::ApiService;

pub fn list_providers(service: &ApiService) -> Result<(), Box<dyn Error>> {
    println!("Supported Providers:");
    println!();
    println!("| Provider | Display Name | URL | Model | API Key |");
    println!("|---|---|---|---|:---:|");

    let active = service.active_provider();
    for builtin in load_builtin_providers() {
        let client = service.client(builtin.id);
        let config = client.config();
        let key_status = if !builtin.requires_api_key {
            "n/a"
        } else if config.has_api_key() {
            "✅"
        } else {
            "❌"
        };
        let provider_id = if builtin.id == active {
            format!("{}*", builtin.id)
        } else {
            builtin.id.to_string()
        };

        println!(
            "| {} | {} | {} | {} | {} |",
            provider_id, builtin.display_name, config.api_url, config.model, key_status
        );
    }

    println!();
    println!("* = active provider");
    Ok(())
}
