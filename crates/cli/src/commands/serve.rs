//! `tidemark serve` - Start the HTTP gateway.

use tidemark_config::AppConfig;

pub async fn run(
    port_override: Option<u16>,
    host_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }

    println!("tidemark gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Retrieval: {}", config.retrieval.backend);
    println!("   Sessions:  {}", config.context.backend);

    tidemark_gateway::start(config).await?;

    Ok(())
}
