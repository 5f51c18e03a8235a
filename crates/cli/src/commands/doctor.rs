//! `tidemark doctor` - Diagnose configuration and backends.

use tidemark_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 tidemark doctor");
    println!("==================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file - using defaults (run `tidemark onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Cannot check backends without a valid config.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured - set OPENAI_API_KEY or api_key");
        issues += 1;
    }

    let providers = tidemark_providers::build_from_config(&config);
    match providers.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  ❌ Provider '{}' rejected the health check", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{}' unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  ❌ Provider '{}' not registered", config.default_provider);
            issues += 1;
        }
    }

    match tidemark_gateway::bootstrap::build_vector_store(&config).await {
        Ok(store) => match store.health_check().await {
            Ok(true) => println!("  ✅ Evidence store '{}' ready", store.name()),
            Ok(false) | Err(_) => {
                println!("  ❌ Evidence store '{}' not responding", store.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Evidence store: {e}");
            issues += 1;
        }
    }

    match tidemark_gateway::bootstrap::build_context_store(&config).await {
        Ok(store) => println!("  ✅ Session store '{}' ready", store.name()),
        Err(e) => {
            println!("  ❌ Session store: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
