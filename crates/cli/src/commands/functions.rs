use mailfn_core::config::{AppConfig, LoadOptions};
use mailfn_core::CatalogEntry;
use mailfn_functions::build_registry;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_REGISTRY};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "functions",
                "config_validation",
                format!("configuration failed to load: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let (registry, summary) = match build_registry(&config.registry) {
        Ok(built) => built,
        Err(error) => {
            return CommandResult::failure(
                "functions",
                "registry",
                format!("function registration failed: {error}"),
                EXIT_REGISTRY,
            )
        }
    };

    let catalog = registry.list_metadata();
    let mut lines = vec![format!(
        "{} function(s) registered for modules [{}]",
        catalog.len(),
        config.registry.allowed_modules.join(", ")
    )];
    lines.extend(catalog.iter().map(render_entry));
    if !summary.skipped.is_empty() {
        lines.push(format!("skipped (module not whitelisted): {}", summary.skipped.join(", ")));
    }

    let data = serde_json::to_value(&catalog).ok();
    CommandResult::success_with_data("functions", lines.join("\n"), data)
}

fn render_entry(entry: &CatalogEntry) -> String {
    let parameters = entry
        .parameters
        .iter()
        .map(|parameter| {
            let marker = if parameter.optional { "?" } else { "" };
            format!("{}{marker}: {}", parameter.name, parameter.kind)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("  - {}.{}({parameters}) {}", entry.module, entry.name, entry.description)
}
