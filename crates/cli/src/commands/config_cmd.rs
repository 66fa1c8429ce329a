//! `tripforge config`: configuration management commands.

use tripforge_config::AppConfig;

const MASK: &str = "********";

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed and validated");

            let mut warnings = Vec::new();
            if !config.has_api_key() && config.providers.values().all(|p| p.api_key.is_none()) {
                warnings.push("No model API key set (set TRIPFORGE_API_KEY or GEMINI_API_KEY)");
            }
            if !config.has_search_credentials() {
                warnings.push(
                    "Search not configured (set GOOGLE_SEARCH_KEY and GOOGLE_SEARCH_CX); \
                     the model will plan without web results",
                );
            }
            if config.gateway.host == "0.0.0.0" {
                warnings.push("Gateway bound to all interfaces");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", config.default_model);
            println!(
                "   Planner:   {} rounds, {} context chars, {}s deadline",
                config.planner.max_iterations,
                config.planner.max_context_chars,
                config.planner.deadline_secs
            );
            println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let config_path = dir.join("config.toml");

    if config_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

/// Replace every secret with a fixed mask.
fn redacted(mut config: AppConfig) -> AppConfig {
    fn mask(slot: &mut Option<String>) {
        if slot.is_some() {
            *slot = Some(MASK.into());
        }
    }

    mask(&mut config.api_key);
    mask(&mut config.search.api_key);
    for provider in config.providers.values_mut() {
        mask(&mut provider.api_key);
    }
    config
}
