//! Builds runtime components from the merged configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tracing::{debug, info};

use chartwise_agent::tools::{ClinicalTrialsTool, SearchProvider, WebSearchConfig, WebSearchTool};
use chartwise_agent::{
    AgentGraph, DirectorySummaryStore, GraphConfig, SharedStatusChannel, ToolRegistry,
};
use chartwise_config::{
    AgentConfig, Backend, ChartwiseConfig, EmbeddingConfig, EmbeddingProvider, IndexBackend,
    ModelConfig, ToolsConfig, WebSearchProvider,
};
use chartwise_index::{InMemoryVectorIndex, SharedIndex, SqliteVectorIndex};
use chartwise_llm::{
    MockEmbedder, ModelHandle, ModelTier, OpenAiBackend, OpenAiConfig, OpenAiEmbedder,
    OpenAiEmbedderConfig, ProviderRegistry, SharedEmbedder,
};

/// Which of the two indexes to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Chunks,
    Memory,
}

// ─────────────────────────────────────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────────────────────────────────────

/// Connect one model tier.
pub fn model_handle(tier: ModelTier, config: &ModelConfig) -> Result<ModelHandle> {
    let api_key = config
        .resolve_api_key()
        .with_context(|| format!("resolving API key for the {tier} model"))?;

    let base = match (config.backend, api_key) {
        (Backend::Ollama, _) => OpenAiConfig::ollama(),
        (Backend::Groq, Some(key)) => OpenAiConfig::groq(key),
        (Backend::Openai, Some(key)) => OpenAiConfig::openai(key),
        (backend, None) => anyhow::bail!("no API key available for {}", backend.name()),
    };
    let mut openai = base
        .with_model(&config.model)
        .with_timeout(Duration::from_secs(config.timeout_secs));
    if let Some(url) = &config.base_url {
        openai = openai.with_base_url(url);
    }

    let backend = OpenAiBackend::new(openai)?;
    debug!(%tier, backend = config.backend.name(), model = %config.model, "Model tier ready");
    Ok(ModelHandle::new(Arc::new(backend), &config.model)
        .with_max_tokens(config.max_tokens)
        .with_timeout(Duration::from_secs(config.timeout_secs)))
}

pub fn build_models(config: &ChartwiseConfig) -> Result<ProviderRegistry> {
    Ok(ProviderRegistry::new()
        .with_tier(ModelTier::Fast, model_handle(ModelTier::Fast, &config.fast_model())?)
        .with_tier(
            ModelTier::Advanced,
            model_handle(ModelTier::Advanced, &config.advanced_model())?,
        ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings / indexes
// ─────────────────────────────────────────────────────────────────────────────

pub fn build_embedder(config: &EmbeddingConfig) -> Result<SharedEmbedder> {
    match config.provider {
        EmbeddingProvider::Mock => Ok(Arc::new(MockEmbedder::new(config.dimensions))),
        EmbeddingProvider::Openai => {
            let key = config
                .resolve_api_key()
                .context("resolving embedding API key")?
                .context("no API key available for embeddings")?;
            let mut openai = OpenAiEmbedderConfig::new(key)
                .with_model(&config.model)
                .with_dimensions(config.dimensions);
            if let Some(url) = &config.base_url {
                openai = openai.with_base_url(url);
            }
            Ok(Arc::new(OpenAiEmbedder::new(openai)?))
        }
    }
}

pub fn open_index(config: &ChartwiseConfig, kind: IndexKind) -> Result<SharedIndex> {
    let index_config = config.index();
    match index_config.backend {
        IndexBackend::Memory => {
            let index: SharedIndex = Arc::new(InMemoryVectorIndex::new());
            Ok(index)
        }
        IndexBackend::Sqlite => {
            let path = match kind {
                IndexKind::Chunks => index_config.chunk_path()?,
                IndexKind::Memory => index_config.memory_path()?,
            };
            let dimensions = config.embedding().dimensions;
            let index = SqliteVectorIndex::open(&path, dimensions)
                .with_context(|| format!("opening index at {}", path.display()))?;
            Ok(Arc::new(index))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

pub fn build_tools(config: &ToolsConfig) -> Result<ToolRegistry> {
    let mut tools = ToolRegistry::new();

    let provider = match config.web_search {
        WebSearchProvider::None => None,
        WebSearchProvider::Duckduckgo => Some(SearchProvider::DuckDuckGo),
        WebSearchProvider::Brave => Some(SearchProvider::Brave {
            api_key: required_search_key(config)?,
        }),
        WebSearchProvider::Tavily => Some(SearchProvider::Tavily {
            api_key: required_search_key(config)?,
        }),
    };
    if let Some(provider) = provider {
        let search = WebSearchTool::new(WebSearchConfig {
            provider,
            ..WebSearchConfig::default()
        })?
        .with_max_results(config.max_results);
        tools.register(search);
    }

    if config.clinical_trials {
        tools.register(ClinicalTrialsTool::new()?.with_page_size(config.max_results));
    }

    debug!(tools = ?tools.names(), "Tools registered");
    Ok(tools)
}

fn required_search_key(config: &ToolsConfig) -> Result<String> {
    config
        .resolve_web_search_key()?
        .context("web search provider needs an API key")
}

pub fn graph_config(config: &AgentConfig) -> GraphConfig {
    GraphConfig {
        memory_k: config.memory_k,
        max_suggestions: config.max_suggestions,
        max_tool_passes: config.max_tool_passes,
        default_language: config.default_language.clone(),
        ..GraphConfig::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────────────────────────────────────

/// Wire a full agent graph from configuration.
pub fn build_graph(config: &ChartwiseConfig, status: SharedStatusChannel) -> Result<AgentGraph> {
    let models = build_models(config)?;
    let embedder = build_embedder(&config.embedding())?;
    let chunk_index = open_index(config, IndexKind::Chunks)?;
    let memory_index = open_index(config, IndexKind::Memory)?;
    let tools = build_tools(&config.tools())?;
    let summaries = DirectorySummaryStore::new(config.summaries().dir()?);

    info!(
        tools = tools.len(),
        summaries = %summaries.dir().display(),
        "Agent wired"
    );

    let graph = AgentGraph::builder()
        .with_models(models)
        .with_embedder(embedder)
        .with_chunk_index(chunk_index)
        .with_memory_index(memory_index)
        .with_tools(tools)
        .with_status(status)
        .with_summaries(Arc::new(summaries))
        .with_config(graph_config(&config.agent()))
        .build()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartwise_config::IndexConfig;
    use chartwise_llm::Embedder;

    #[test]
    fn test_build_tools_default() {
        let tools = build_tools(&ToolsConfig::default()).unwrap();
        assert!(tools.contains("web_search"));
        assert!(tools.contains("clinical_trials"));
    }

    #[test]
    fn test_build_tools_none() {
        let config = ToolsConfig {
            web_search: WebSearchProvider::None,
            clinical_trials: false,
            ..ToolsConfig::default()
        };
        assert!(build_tools(&config).unwrap().is_empty());
    }

    #[test]
    fn test_build_tools_missing_key() {
        let config = ToolsConfig {
            web_search: WebSearchProvider::Tavily,
            web_search_api_key_env: Some("CHARTWISE_TEST_UNSET_TAVILY_KEY".to_string()),
            ..ToolsConfig::default()
        };
        // TAVILY_API_KEY may exist in the environment; only assert when absent.
        if std::env::var("TAVILY_API_KEY").is_err() {
            assert!(build_tools(&config).is_err());
        }
    }

    #[test]
    fn test_mock_embedder_needs_no_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Mock,
            dimensions: 8,
            ..EmbeddingConfig::default()
        };
        assert_eq!(build_embedder(&config).unwrap().dimensions(), 8);
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = ModelConfig {
            backend: Backend::Ollama,
            model: "llama3.2".to_string(),
            base_url: None,
            api_key_env: None,
            api_key: None,
            timeout_secs: 30,
            max_tokens: 256,
        };
        let handle = model_handle(ModelTier::Fast, &config).unwrap();
        assert_eq!(handle.model(), "llama3.2");
    }

    #[test]
    fn test_inline_key_is_used() {
        let config = ModelConfig {
            backend: Backend::Groq,
            model: "llama-3.1-8b-instant".to_string(),
            base_url: None,
            api_key_env: Some("CHARTWISE_TEST_UNSET_GROQ_KEY".to_string()),
            api_key: Some("inline".to_string()),
            timeout_secs: 30,
            max_tokens: 256,
        };
        let handle = model_handle(ModelTier::Advanced, &config).unwrap();
        assert_eq!(handle.backend_name(), "groq");
    }

    #[test]
    fn test_open_sqlite_index_under_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChartwiseConfig {
            embedding: Some(EmbeddingConfig {
                provider: EmbeddingProvider::Mock,
                dimensions: 8,
                ..EmbeddingConfig::default()
            }),
            index: Some(IndexConfig {
                backend: IndexBackend::Sqlite,
                chunk_path: Some(dir.path().join("nested/chunks.db")),
                memory_path: Some(dir.path().join("memory.db")),
            }),
            ..ChartwiseConfig::default()
        };
        open_index(&config, IndexKind::Chunks).unwrap();
        open_index(&config, IndexKind::Memory).unwrap();
        assert!(dir.path().join("nested/chunks.db").exists());
        assert!(dir.path().join("memory.db").exists());
    }

    #[test]
    fn test_graph_config_from_agent_section() {
        let agent = AgentConfig {
            memory_k: 2,
            max_suggestions: 1,
            max_tool_passes: 4,
            default_language: "de".to_string(),
        };
        let graph = graph_config(&agent);
        assert_eq!(graph.memory_k, 2);
        assert_eq!(graph.max_suggestions, 1);
        assert_eq!(graph.max_tool_passes, 4);
        assert_eq!(graph.default_language, "de");
    }
}
