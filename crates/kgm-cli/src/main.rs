//! kgmerge CLI - Command-line interface
//!
//! Usage:
//!   kgm merge <chunks.json> [-o merged.json]
//!   kgm resolve <entities.json>
//!   kgm config

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use kgm_core::{AppConfig, ChunkResult, Entity, KnowledgeGraph, LoggingConfig};
use kgm_llm::create_llm_client;
use kgm_resolver::{EntityResolver, LlmArbitrator, ParallelMerger, ResolutionStats};

#[derive(Parser)]
#[command(name = "kgm")]
#[command(about = "Merge per-chunk knowledge graphs into one consistent graph")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a JSON array of chunk results into one graph
    Merge {
        /// Chunk results file
        input: PathBuf,
        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Maximum concurrent merges per round
        #[arg(long)]
        max_workers: Option<usize>,
        /// Skip the LLM arbitration layer
        #[arg(long)]
        no_arbitration: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Resolve a flat entity list and print the id remap table
    Resolve {
        /// Entity list or graph file
        input: PathBuf,
        /// Skip the LLM arbitration layer
        #[arg(long)]
        no_arbitration: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Entities to resolve: a bare list, or a graph whose relationships are ignored
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityInput {
    Entities(Vec<Entity>),
    Graph(KnowledgeGraph),
}

impl EntityInput {
    fn into_entities(self) -> Vec<Entity> {
        match self {
            Self::Entities(entities) => entities,
            Self::Graph(graph) => graph.entities,
        }
    }
}

#[derive(Serialize)]
struct ResolveOutput {
    entities: Vec<Entity>,
    id_remap: BTreeMap<String, String>,
    stats: ResolutionStats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            input,
            output,
            max_workers,
            no_arbitration,
            config,
        } => {
            let mut config = load_config(config.config.as_deref())?;
            if let Some(n) = max_workers {
                config.merge.max_workers = n;
            }
            if no_arbitration {
                config.resolver.enable_arbitration = false;
            }
            config.validate()?;
            init_logging(&config.logging);
            run_merge(&config, &input, output.as_deref()).await?;
        }
        Commands::Resolve {
            input,
            no_arbitration,
            config,
        } => {
            let mut config = load_config(config.config.as_deref())?;
            if no_arbitration {
                config.resolver.enable_arbitration = false;
            }
            init_logging(&config.logging);
            run_resolve(&config, &input).await?;
        }
        Commands::Config { config } => {
            let config = load_config(config.config.as_deref())?;
            println!("{}", render_config(&config)?);
        }
    }

    Ok(())
}

// ============================================================================
// Setup
// ============================================================================

/// File (if given) or defaults, then environment overrides
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    let config = config.with_env_override()?;
    config.validate()?;
    Ok(config)
}

/// Logs go to stderr so stdout stays valid JSON
fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolver with an LLM arbitrator attached when arbitration is enabled and
/// a client can be built
fn build_resolver(config: &AppConfig) -> EntityResolver {
    let resolver = EntityResolver::new(config.resolver.clone());
    if !config.resolver.enable_arbitration {
        return resolver;
    }

    match create_llm_client(&config.llm) {
        Ok(client) => resolver.with_arbitrator(Arc::new(LlmArbitrator::new(client))),
        Err(e) => {
            warn!(error = %e, "LLM client unavailable, arbitration disabled");
            resolver
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_merge(config: &AppConfig, input: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let results: Vec<ChunkResult> = read_json(input)?;
    info!(chunks = results.len(), input = %input.display(), "Merging chunk results");

    let resolver = Arc::new(build_resolver(config));
    let merger = ParallelMerger::from_config(resolver, &config.merge);
    let merged = merger
        .merge_chunk_results(results)
        .await
        .context("merge failed")?;

    info!(
        entities = merged.graph.entities.len(),
        relationships = merged.graph.relationships.len(),
        tokens = merged.tokens.total(),
        "Merge complete"
    );
    write_json(&merged, output)
}

async fn run_resolve(config: &AppConfig, input: &Path) -> anyhow::Result<()> {
    let entities = read_json::<EntityInput>(input)?.into_entities();
    let resolver = build_resolver(config);
    let resolution = resolver
        .resolve_checked(&entities)
        .await
        .with_context(|| format!("cannot resolve {}", input.display()))?;

    let output = ResolveOutput {
        entities: resolution.entities,
        id_remap: resolution.id_remap.into_iter().collect(),
        stats: resolution.stats,
    };
    write_json(&output, None)
}

/// Effective configuration as TOML, with the API key masked
fn render_config(config: &AppConfig) -> anyhow::Result<String> {
    let mut shown = config.clone();
    if shown.llm.openai_api_key.is_some() {
        shown.llm.openai_api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown).context("failed to render configuration")
}

// ============================================================================
// I/O
// ============================================================================

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_merge_flags() {
        let cli = Cli::try_parse_from([
            "kgm",
            "merge",
            "chunks.json",
            "-o",
            "merged.json",
            "--max-workers",
            "8",
            "--no-arbitration",
        ])
        .unwrap();

        match cli.command {
            Commands::Merge {
                input,
                output,
                max_workers,
                no_arbitration,
                config,
            } => {
                assert_eq!(input, PathBuf::from("chunks.json"));
                assert_eq!(output, Some(PathBuf::from("merged.json")));
                assert_eq!(max_workers, Some(8));
                assert!(no_arbitration);
                assert!(config.config.is_none());
            }
            _ => panic!("expected merge command"),
        }
    }

    #[test]
    fn test_entity_input_shapes() {
        let list: EntityInput =
            serde_json::from_str(r#"[{"id": "e1", "label": "Lock"}]"#).unwrap();
        assert_eq!(list.into_entities().len(), 1);

        let graph: EntityInput = serde_json::from_str(
            r#"{"entities": [{"id": "e1", "label": "Lock"}, {"id": "e2", "label": "Mutex"}],
                "relationships": [{"source": "e1", "target": "e2", "type": "IsA"}]}"#,
        )
        .unwrap();
        assert_eq!(graph.into_entities().len(), 2);
    }

    #[test]
    fn test_resolver_without_key_skips_arbitration() {
        let mut config = AppConfig::default();
        config.llm.openai_api_key = None;
        assert!(!build_resolver(&config).arbitration_enabled());

        config.llm.openai_api_key = Some("key".to_string());
        assert!(build_resolver(&config).arbitration_enabled());

        config.resolver.enable_arbitration = false;
        assert!(!build_resolver(&config).arbitration_enabled());
    }

    #[test]
    fn test_render_config_masks_key() {
        let mut config = AppConfig::default();
        config.llm.openai_api_key = Some("sk-secret".to_string());

        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("jaccard_threshold"));
    }
}
