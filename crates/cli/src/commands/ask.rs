//! `tidemark ask` - One query through the full pipeline.

use std::path::PathBuf;
use tidemark_config::AppConfig;
use tidemark_core::map::MapState;
use tidemark_core::message::SessionId;

pub async fn run(
    query: String,
    session: String,
    map_state: Option<PathBuf>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TIDEMARK_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add api_key to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let map_state = match map_state {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            serde_json::from_str::<MapState>(&raw)
                .map_err(|e| format!("Invalid map state in {}: {e}", path.display()))?
        }
        None => MapState::default(),
    };

    let agent = tidemark_gateway::build_agent(&config).await?;
    let outcome = agent
        .run(&query, &map_state, &SessionId::from(session))
        .await?;

    if verbose {
        eprintln!("Model: {}", agent.settings().model);
        let layers: Vec<&str> = outcome.layers.iter().map(|l| l.as_str()).collect();
        eprintln!("Detected layers: {}", if layers.is_empty() { "none".to_string() } else { layers.join(", ") });
        for chunk in &outcome.evidence {
            eprintln!(
                "  [{}] {} (similarity {:.3}) {}",
                chunk.confidence,
                chunk.id,
                chunk.similarity,
                chunk.filename.as_deref().unwrap_or("")
            );
        }
        if outcome.dropped_actions > 0 {
            eprintln!("Dropped {} invalid map action(s)", outcome.dropped_actions);
        }
    }

    println!("{}", serde_json::to_string_pretty(&outcome.response)?);

    Ok(())
}
