use crate::{config::Config, environment::Environment};

/// Prints the resolved configuration as JSON with secrets masked.
pub fn print_config(config: &Config, environment: Environment) {
    println!("🌍 Environment: {environment}");

    match serde_json::to_string_pretty(&config.redacted()) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("❌ Failed to render configuration: {e}"),
    }
}
