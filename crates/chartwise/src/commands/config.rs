//! Config command - inspect the merged configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use chartwise_config::{ChartwiseConfig, ModelConfig, WebSearchProvider};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved configuration and both model tiers
    Show,

    /// Show which config files are loaded and their precedence
    Which,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("# chartwise Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("Models:");
    println!("  {}", model_line("fast", &config.fast_model()));
    println!("  {}", model_line("advanced", &config.advanced_model()));
    println!();

    for line in summary_lines(config) {
        println!("{line}");
    }
    println!();

    if !loaded.warnings.is_empty() {
        let yellow = Style::new().yellow();
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  {} {}", yellow.apply_to("⚠"), w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = ctx.loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found (using defaults).");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn model_line(tier: &str, model: &ModelConfig) -> String {
    let key = match model.resolve_api_key() {
        Ok(Some(_)) if model.has_plaintext_api_key() => "key: config file",
        Ok(Some(_)) => "key: env",
        Ok(None) => "key: not needed",
        Err(_) => "key: missing",
    };
    format!(
        "{:<10} {} / {}  ({}, {}s timeout)",
        tier,
        model.backend.name(),
        model.model,
        key,
        model.timeout_secs
    )
}

fn summary_lines(config: &ChartwiseConfig) -> Vec<String> {
    let embedding = config.embedding();
    let index = config.index();
    let agent = config.agent();
    let tools = config.tools();

    let path_or = |p: chartwise_config::Result<std::path::PathBuf>| match p {
        Ok(p) => p.display().to_string(),
        Err(_) => "(no default path)".to_string(),
    };

    let web_search = match tools.web_search {
        WebSearchProvider::None => "off",
        WebSearchProvider::Duckduckgo => "duckduckgo",
        WebSearchProvider::Tavily => "tavily",
        WebSearchProvider::Brave => "brave",
    };

    vec![
        format!(
            "Embedding: {:?} / {} ({} dims)",
            embedding.provider, embedding.model, embedding.dimensions
        ),
        format!("Index: {:?}", index.backend),
        format!("  chunks: {}", path_or(index.chunk_path())),
        format!("  memory: {}", path_or(index.memory_path())),
        format!(
            "Agent: memory_k={} max_suggestions={} max_tool_passes={} language={}",
            agent.memory_k, agent.max_suggestions, agent.max_tool_passes, agent.default_language
        ),
        format!(
            "Tools: web_search={} clinical_trials={} max_results={}",
            web_search, tools.clinical_trials, tools.max_results
        ),
        format!("Summaries: {}", path_or(config.summaries().dir())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartwise_config::Backend;

    #[test]
    fn test_model_line_ollama() {
        let model = ModelConfig {
            backend: Backend::Ollama,
            model: "llama3.2".to_string(),
            base_url: None,
            api_key_env: None,
            api_key: None,
            timeout_secs: 30,
            max_tokens: 512,
        };
        assert_eq!(
            model_line("fast", &model),
            "fast       ollama / llama3.2  (key: not needed, 30s timeout)"
        );
    }

    #[test]
    fn test_summary_lines_from_toml() {
        let config = ChartwiseConfig::from_toml(
            r#"
[tools]
web_search = "none"
clinical_trials = false

[agent]
default_language = "es"
"#,
        )
        .unwrap();
        let lines = summary_lines(&config);
        assert!(lines.iter().any(|l| l.starts_with("Tools: web_search=off clinical_trials=false")));
        assert!(lines.iter().any(|l| l.ends_with("language=es")));
    }
}
