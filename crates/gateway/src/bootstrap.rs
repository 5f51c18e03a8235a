//! Builds a [`ClimateAgent`] from configuration.
//!
//! Backend selection happens once here. A store that cannot be opened at
//! startup is fatal; once running, retrieval failures only degrade answers.

use std::sync::Arc;
use tidemark_agent::{AgentSettings, ClimateAgent, ProviderEmbedder, Retriever};
use tidemark_config::AppConfig;
use tidemark_core::context::ContextStore;
use tidemark_core::error::Error;
use tidemark_core::evidence::VectorStore;
use tidemark_memory::{
    InMemoryContextStore, InMemoryVectorStore, NoopVectorStore, PgVectorStore,
    SqliteContextStore,
};
use tracing::{info, warn};

pub async fn build_agent(config: &AppConfig) -> Result<ClimateAgent, Error> {
    let providers = tidemark_providers::build_from_config(config);
    let provider = providers.default().ok_or_else(|| Error::Config {
        message: format!("provider '{}' is not registered", providers.default_name()),
    })?;

    let context = build_context_store(config).await?;
    let store = build_vector_store(config).await?;
    let embedder = Arc::new(ProviderEmbedder::new(
        provider.clone(),
        &config.embedding_model,
    ));

    let mut settings = AgentSettings::from_config(config);
    settings.model = tidemark_providers::resolve_model(config);

    info!(
        provider = provider.name(),
        model = %settings.model,
        context = context.name(),
        evidence = store.name(),
        "Agent ready"
    );

    Ok(ClimateAgent::new(
        provider,
        Retriever::new(embedder, store),
        context,
        settings,
    ))
}

pub async fn build_context_store(config: &AppConfig) -> Result<Arc<dyn ContextStore>, Error> {
    match config.context.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryContextStore::new())),
        "sqlite" => {
            let path = config.sqlite_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Config {
                    message: format!("cannot create {}: {e}", parent.display()),
                })?;
            }
            let store = SqliteContextStore::new(&format!("sqlite://{}", path.display())).await?;
            Ok(Arc::new(store))
        }
        other => Err(Error::Config {
            message: format!("unknown context backend '{other}'"),
        }),
    }
}

pub async fn build_vector_store(config: &AppConfig) -> Result<Arc<dyn VectorStore>, Error> {
    let retrieval = &config.retrieval;
    match retrieval.backend.as_str() {
        "memory" => match &retrieval.corpus_path {
            Some(path) => Ok(Arc::new(InMemoryVectorStore::from_json_file(path)?)),
            None => {
                warn!("No corpus_path configured, evidence store is empty");
                Ok(Arc::new(InMemoryVectorStore::new(Vec::new())))
            }
        },
        "postgres" => {
            let url = retrieval.database_url.as_deref().ok_or_else(|| Error::Config {
                message: "retrieval.backend = \"postgres\" requires database_url".into(),
            })?;
            let store = PgVectorStore::connect(url).await?;
            if let Err(e) = store.migrate().await {
                warn!(error = %e, "Evidence schema migration skipped");
            }
            Ok(Arc::new(store))
        }
        "none" => Ok(Arc::new(NoopVectorStore)),
        other => Err(Error::Config {
            message: format!("unknown retrieval backend '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_agent() {
        let config = AppConfig::default();
        let agent = build_agent(&config).await.unwrap();
        assert_eq!(agent.provider_name(), "openai");
        assert_eq!(agent.context_store().name(), "memory");
    }

    #[tokio::test]
    async fn unknown_context_backend_is_fatal() {
        let mut config = AppConfig::default();
        config.context.backend = "redis".into();
        assert!(matches!(
            build_context_store(&config).await,
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn missing_corpus_file_is_fatal() {
        let mut config = AppConfig::default();
        config.retrieval.corpus_path = Some("/nonexistent/corpus.json".into());
        assert!(matches!(
            build_vector_store(&config).await,
            Err(Error::Retrieval(_))
        ));
    }

    #[tokio::test]
    async fn sqlite_context_in_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.context.backend = "sqlite".into();
        config.context.sqlite_path = Some(dir.path().join("nested").join("sessions.db"));

        let store = build_context_store(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn none_backend_is_noop() {
        let mut config = AppConfig::default();
        config.retrieval.backend = "none".into();
        let store = build_vector_store(&config).await.unwrap();
        assert_eq!(store.name(), "none");
    }
}
