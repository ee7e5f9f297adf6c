//! Web search tool.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::tool::{ParamExt, ParameterValidationError, Tool, ToolContext, ToolResult};

/// Upper bound on `max_results` accepted from the model.
const MAX_RESULTS_LIMIT: u64 = 10;

/// Web search provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum SearchProvider {
    /// Brave Search API
    Brave { api_key: String },
    /// Tavily Search API
    Tavily { api_key: String },
    /// DuckDuckGo instant answers (no key, limited)
    DuckDuckGo,
}

impl SearchProvider {
    pub fn name(&self) -> &'static str {
        match self {
            SearchProvider::Brave { .. } => "brave",
            SearchProvider::Tavily { .. } => "tavily",
            SearchProvider::DuckDuckGo => "duckduckgo",
        }
    }
}

/// Configuration for web search.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub provider: SearchProvider,
    /// Default number of results when the call does not ask for a count.
    pub max_results: usize,
    pub timeout: Duration,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::DuckDuckGo,
            max_results: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Tool for searching the web for general medical information.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: Client,
    config: WebSearchConfig,
}

impl WebSearchTool {
    pub fn new(config: WebSearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn duckduckgo() -> Result<Self> {
        Self::new(WebSearchConfig::default())
    }

    pub fn brave(api_key: impl Into<String>) -> Result<Self> {
        Self::new(WebSearchConfig {
            provider: SearchProvider::Brave {
                api_key: api_key.into(),
            },
            ..Default::default()
        })
    }

    pub fn tavily(api_key: impl Into<String>) -> Result<Self> {
        Self::new(WebSearchConfig {
            provider: SearchProvider::Tavily {
                api_key: api_key.into(),
            },
            ..Default::default()
        })
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    pub fn provider(&self) -> &SearchProvider {
        &self.config.provider
    }

    async fn fetch_json(&self, request: reqwest::RequestBuilder, provider: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Tool(format!("{} search failed: {}", provider, e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Tool(format!(
                "{} search error: {}",
                provider,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Tool(format!("Failed to parse {} response: {}", provider, e)))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        match &self.config.provider {
            SearchProvider::Brave { api_key } => {
                let url = format!(
                    "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
                    urlencoding::encode(query),
                    limit
                );
                let request = self
                    .client
                    .get(&url)
                    .header("X-Subscription-Token", api_key)
                    .header("Accept", "application/json");
                Ok(parse_brave(&self.fetch_json(request, "Brave").await?, limit))
            }
            SearchProvider::Tavily { api_key } => {
                let request = self.client.post("https://api.tavily.com/search").json(&json!({
                    "api_key": api_key,
                    "query": query,
                    "max_results": limit
                }));
                Ok(parse_tavily(&self.fetch_json(request, "Tavily").await?, limit))
            }
            SearchProvider::DuckDuckGo => {
                let url = format!(
                    "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
                    urlencoding::encode(query)
                );
                let request = self.client.get(&url);
                Ok(parse_duckduckgo(&self.fetch_json(request, "DuckDuckGo").await?, limit))
            }
        }
    }
}

/// Brave: `web.results[].{title, url, description}`.
pub fn parse_brave(data: &Value, limit: usize) -> Vec<SearchResult> {
    collect_results(&data["web"]["results"], "url", "description", limit)
}

/// Tavily: `results[].{title, url, content}`.
pub fn parse_tavily(data: &Value, limit: usize) -> Vec<SearchResult> {
    collect_results(&data["results"], "url", "content", limit)
}

fn collect_results(items: &Value, url_key: &str, snippet_key: &str, limit: usize) -> Vec<SearchResult> {
    items
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    Some(SearchResult {
                        title: r["title"].as_str()?.to_string(),
                        url: r[url_key].as_str()?.to_string(),
                        snippet: r[snippet_key].as_str().unwrap_or("").to_string(),
                    })
                })
                .take(limit)
                .collect()
        })
        .unwrap_or_default()
}

/// DuckDuckGo: the abstract, then related topics.
pub fn parse_duckduckgo(data: &Value, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(abstract_text) = data["AbstractText"].as_str()
        && !abstract_text.is_empty()
    {
        results.push(SearchResult {
            title: data["Heading"].as_str().unwrap_or("Result").to_string(),
            url: data["AbstractURL"].as_str().unwrap_or("").to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(topics) = data["RelatedTopics"].as_array() {
        for topic in topics {
            if results.len() >= limit {
                break;
            }
            if let (Some(text), Some(url)) = (topic["Text"].as_str(), topic["FirstURL"].as_str()) {
                let title: String = text.chars().take(60).collect();
                results.push(SearchResult {
                    title,
                    url: url.to_string(),
                    snippet: text.to_string(),
                });
            }
        }
    }

    results.truncate(limit);
    results
}

/// Numbered plain-text listing handed back to the model.
pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No web results found for \"{}\".", query);
    }
    let mut out = format!("Web results for \"{}\":\n", query);
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n   {}\n", i + 1, r.title, r.url));
        if !r.snippet.is_empty() {
            out.push_str(&format!("   {}\n", r.snippet));
        }
    }
    out
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for general medical information, such as what a condition, test or \
         medication is. Never use it for facts about this patient's own record."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_RESULTS_LIMIT,
                    "description": "How many results to return"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let query = params.required_str("query", "provide the text to search for")?;
        let limit = params.optional_u64("max_results", self.config.max_results as u64);
        if limit == 0 || limit > MAX_RESULTS_LIMIT {
            return Err(ParameterValidationError::out_of_range(
                "max_results",
                limit,
                format!("must be between 1 and {}", MAX_RESULTS_LIMIT),
            )
            .into());
        }

        let results = self.search(query, limit as usize).await?;
        debug!(
            patient_id = %ctx.patient_id,
            turn_id = %ctx.turn_id,
            provider = self.config.provider.name(),
            results = results.len(),
            "Web search complete"
        );
        Ok(ToolResult::text(format_results(query, &results)))
    }
}
