//! Configuration schema.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration. Every section is optional; accessors fall back to
/// defaults for missing sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartwiseConfig {
    #[serde(default, skip_serializing_if = "ModelsConfig::is_empty")]
    pub models: ModelsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summaries: Option<SummariesConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl ChartwiseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections replace wholesale; the two model tiers merge independently.
    pub fn merge(&mut self, other: ChartwiseConfig) {
        if other.models.fast.is_some() {
            self.models.fast = other.models.fast;
        }
        if other.models.advanced.is_some() {
            self.models.advanced = other.models.advanced;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.index.is_some() {
            self.index = other.index;
        }
        if other.agent.is_some() {
            self.agent = other.agent;
        }
        if other.tools.is_some() {
            self.tools = other.tools;
        }
        if other.summaries.is_some() {
            self.summaries = other.summaries;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    pub fn fast_model(&self) -> ModelConfig {
        self.models.fast.clone().unwrap_or_else(ModelConfig::default_fast)
    }

    pub fn advanced_model(&self) -> ModelConfig {
        self.models
            .advanced
            .clone()
            .unwrap_or_else(ModelConfig::default_advanced)
    }

    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    pub fn index(&self) -> IndexConfig {
        self.index.clone().unwrap_or_default()
    }

    pub fn agent(&self) -> AgentConfig {
        self.agent.clone().unwrap_or_default()
    }

    pub fn tools(&self) -> ToolsConfig {
        self.tools.clone().unwrap_or_default()
    }

    pub fn summaries(&self) -> SummariesConfig {
        self.summaries.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────────────────────────────────────

/// `[models.fast]` and `[models.advanced]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast: Option<ModelConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced: Option<ModelConfig>,
}

impl ModelsConfig {
    fn is_empty(&self) -> bool {
        self.fast.is_none() && self.advanced.is_none()
    }
}

/// Model backends reachable through the OpenAI-compatible client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Openai,
    Groq,
    Ollama,
}

impl Backend {
    /// Default environment variable holding this backend's API key.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Backend::Openai => Some("OPENAI_API_KEY"),
            Backend::Groq => Some("GROQ_API_KEY"),
            Backend::Ollama => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Openai => "openai",
            Backend::Groq => "groq",
            Backend::Ollama => "ollama",
        }
    }
}

/// One model tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: Backend,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1024
}

impl ModelConfig {
    fn with_model(model: &str) -> Self {
        Self {
            backend: Backend::Openai,
            model: model.to_string(),
            base_url: None,
            api_key_env: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn default_fast() -> Self {
        Self::with_model("gpt-4o-mini")
    }

    pub fn default_advanced() -> Self {
        Self::with_model("gpt-4o")
    }

    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve the API key from the process environment.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key: named env var, then the backend's default env
    /// var, then the inline `api_key`. Ollama needs no key.
    pub fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<String>> {
        resolve_key(
            self.backend.name(),
            self.api_key_env.as_deref(),
            self.backend.env_var(),
            self.api_key.as_deref(),
            lookup,
        )
    }
}

fn resolve_key(
    backend: &str,
    explicit_env: Option<&str>,
    default_env: Option<&str>,
    inline: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<String>> {
    for name in [explicit_env, default_env].into_iter().flatten() {
        if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
            return Ok(Some(value));
        }
    }
    if let Some(key) = inline {
        return Ok(Some(key.to_string()));
    }
    match explicit_env.or(default_env) {
        Some(env_var) => Err(ConfigError::ApiKeyNotFound {
            backend: backend.to_string(),
            env_var: env_var.to_string(),
        }),
        None => Ok(None),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Openai,
    /// Deterministic offline embeddings.
    Mock,
}

/// `[embedding]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Openai,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            base_url: None,
            api_key_env: None,
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve the embedding API key from the process environment.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        match self.provider {
            EmbeddingProvider::Mock => Ok(None),
            EmbeddingProvider::Openai => resolve_key(
                "openai",
                self.api_key_env.as_deref(),
                Some("OPENAI_API_KEY"),
                self.api_key.as_deref(),
                |name| std::env::var(name).ok(),
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Sqlite,
    Memory,
}

/// `[index]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_path: Option<PathBuf>,
}

impl IndexConfig {
    /// Chunk index file, defaulting to `<data_dir>/chunks.db`.
    pub fn chunk_path(&self) -> Result<PathBuf> {
        match &self.chunk_path {
            Some(p) => Ok(p.clone()),
            None => default_data_file("chunks.db"),
        }
    }

    /// Memory index file, defaulting to `<data_dir>/memory.db`.
    pub fn memory_path(&self) -> Result<PathBuf> {
        match &self.memory_path {
            Some(p) => Ok(p.clone()),
            None => default_data_file("memory.db"),
        }
    }
}

fn default_data_file(name: &str) -> Result<PathBuf> {
    crate::discovery::data_dir()
        .map(|d| d.join(name))
        .ok_or_else(|| ConfigError::NoDefaultPath(name.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// `[agent]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Long-term memories recalled per model call.
    pub memory_k: usize,
    /// Follow-up questions generated after each answer.
    pub max_suggestions: usize,
    /// Ceiling on tools→callModel cycles per turn.
    pub max_tool_passes: usize,
    pub default_language: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            memory_k: 5,
            max_suggestions: 3,
            max_tool_passes: 8,
            default_language: "en".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSearchProvider {
    #[default]
    Duckduckgo,
    Tavily,
    Brave,
    /// Do not register the web search tool.
    None,
}

/// `[tools]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub web_search: WebSearchProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_api_key_env: Option<String>,
    pub clinical_trials: bool,
    pub max_results: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web_search: WebSearchProvider::Duckduckgo,
            web_search_api_key_env: None,
            clinical_trials: true,
            max_results: 5,
        }
    }
}

impl ToolsConfig {
    /// Resolve the web search API key. DuckDuckGo needs none.
    pub fn resolve_web_search_key(&self) -> Result<Option<String>> {
        let (name, default_env) = match self.web_search {
            WebSearchProvider::Duckduckgo | WebSearchProvider::None => return Ok(None),
            WebSearchProvider::Tavily => ("tavily", "TAVILY_API_KEY"),
            WebSearchProvider::Brave => ("brave", "BRAVE_API_KEY"),
        };
        resolve_key(
            name,
            self.web_search_api_key_env.as_deref(),
            Some(default_env),
            None,
            |var| std::env::var(var).ok(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Summaries / Logging
// ─────────────────────────────────────────────────────────────────────────────

/// `[summaries]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummariesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl SummariesConfig {
    /// Summary directory, defaulting to `<data_dir>/summaries`.
    pub fn dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(d) => Ok(d.clone()),
            None => default_data_file("summaries"),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ChartwiseConfig::from_toml(
            r#"
[models.fast]
backend = "groq"
model = "llama-3.1-8b-instant"
timeout_secs = 15

[models.advanced]
model = "gpt-4o"
max_tokens = 2048

[embedding]
provider = "mock"
dimensions = 64

[index]
backend = "memory"

[agent]
memory_k = 3
max_tool_passes = 4

[tools]
web_search = "tavily"
clinical_trials = false

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let fast = config.fast_model();
        assert_eq!(fast.backend, Backend::Groq);
        assert_eq!(fast.timeout_secs, 15);
        assert_eq!(fast.max_tokens, 1024);

        let advanced = config.advanced_model();
        assert_eq!(advanced.backend, Backend::Openai);
        assert_eq!(advanced.max_tokens, 2048);

        let embedding = config.embedding();
        assert_eq!(embedding.provider, EmbeddingProvider::Mock);
        assert_eq!(embedding.dimensions, 64);
        assert_eq!(embedding.model, "text-embedding-3-small");

        assert_eq!(config.index().backend, IndexBackend::Memory);
        let agent = config.agent();
        assert_eq!(agent.memory_k, 3);
        assert_eq!(agent.max_suggestions, 3);
        assert_eq!(agent.max_tool_passes, 4);
        assert_eq!(agent.default_language, "en");

        let tools = config.tools();
        assert_eq!(tools.web_search, WebSearchProvider::Tavily);
        assert!(!tools.clinical_trials);
        assert_eq!(config.logging().level, "debug");
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = ChartwiseConfig::from_toml("").unwrap();
        assert_eq!(config.fast_model().model, "gpt-4o-mini");
        assert_eq!(config.advanced_model().model, "gpt-4o");
        assert_eq!(config.agent(), AgentConfig::default());
        assert_eq!(config.tools().max_results, 5);
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = ChartwiseConfig::from_toml(
            r#"
[models.fast]
model = "base-fast"
[models.advanced]
model = "base-advanced"
[agent]
memory_k = 9
"#,
        )
        .unwrap();
        let overlay = ChartwiseConfig::from_toml(
            r#"
[models.fast]
model = "project-fast"
[agent]
max_suggestions = 1
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.fast_model().model, "project-fast");
        assert_eq!(base.advanced_model().model, "base-advanced");
        // Section replaced wholesale: memory_k back to default
        assert_eq!(base.agent().memory_k, 5);
        assert_eq!(base.agent().max_suggestions, 1);
    }

    #[test]
    fn test_api_key_resolution_order() {
        let mut model = ModelConfig::default_fast();
        model.api_key_env = Some("CUSTOM_KEY".to_string());
        model.api_key = Some("inline".to_string());

        let env = |name: &str| match name {
            "CUSTOM_KEY" => Some("from-custom".to_string()),
            "OPENAI_API_KEY" => Some("from-default".to_string()),
            _ => None,
        };
        assert_eq!(
            model.resolve_api_key_with(env).unwrap().as_deref(),
            Some("from-custom")
        );

        let only_default = |name: &str| (name == "OPENAI_API_KEY").then(|| "d".to_string());
        assert_eq!(model.resolve_api_key_with(only_default).unwrap().as_deref(), Some("d"));

        assert_eq!(
            model.resolve_api_key_with(|_| None).unwrap().as_deref(),
            Some("inline")
        );

        model.api_key = None;
        let err = model.resolve_api_key_with(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::ApiKeyNotFound { .. }));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut model = ModelConfig::default_fast();
        model.backend = Backend::Ollama;
        assert_eq!(model.resolve_api_key_with(|_| None).unwrap(), None);
    }

    #[test]
    fn test_round_trip_to_toml() {
        let mut config = ChartwiseConfig::new();
        config.agent = Some(AgentConfig {
            memory_k: 2,
            ..AgentConfig::default()
        });
        let text = config.to_toml().unwrap();
        assert!(text.contains("memory_k = 2"));
        assert_eq!(ChartwiseConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_explicit_paths_win() {
        let index = IndexConfig {
            backend: IndexBackend::Sqlite,
            chunk_path: Some(PathBuf::from("/tmp/c.db")),
            memory_path: Some(PathBuf::from("/tmp/m.db")),
        };
        assert_eq!(index.chunk_path().unwrap(), PathBuf::from("/tmp/c.db"));
        assert_eq!(index.memory_path().unwrap(), PathBuf::from("/tmp/m.db"));
    }
}
