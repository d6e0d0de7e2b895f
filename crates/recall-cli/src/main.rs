use clap::{Parser, Subcommand};
use recall_retrieval::{
    EngineRequest, EngineResponse, FileCorpusStore, LocalEmbedding, RecallConfig, RecallEngine,
    SearchMode,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recall", about = "Recall: search and cite the pages you have already read")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "recall.toml")]
    config: PathBuf,

    /// Print raw JSON responses instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store a visited page
    Ingest {
        /// HTML or plain-text file holding the page content
        file: PathBuf,
        /// Page URL
        #[arg(long)]
        url: String,
        /// Page title (defaults to the URL)
        #[arg(long)]
        title: Option<String>,
        /// Seconds spent on the page during this visit
        #[arg(long, default_value_t = 0)]
        dwell: u64,
    },
    /// Rank stored pages for a query
    Search {
        query: String,
        /// semantic, keyword or hybrid (overrides config)
        #[arg(short, long)]
        mode: Option<SearchMode>,
        /// Number of results (overrides config)
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Assemble a cited context block for a question
    Context {
        query: String,
        /// Number of passages (overrides config)
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show how a file would be split into passages
    Chunk {
        file: PathBuf,
    },
}

#[derive(Deserialize)]
struct CliConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default = "default_embedding_dimension")]
    embedding_dimension: usize,
    #[serde(default)]
    engine: RecallConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_embedding_dimension() -> usize {
    256
}

async fn load_config(path: &Path) -> anyhow::Result<CliConfig> {
    if !path.exists() {
        return Ok(CliConfig {
            data_dir: default_data_dir(),
            embedding_dimension: default_embedding_dimension(),
            engine: RecallConfig::default(),
        });
    }
    let config_str = tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
    })?;
    parse_config(&config_str)
}

fn parse_config(input: &str) -> anyhow::Result<CliConfig> {
    let config: CliConfig = toml::from_str(input)?;
    config.engine.validate()?;
    if config.embedding_dimension == 0 {
        anyhow::bail!("embedding_dimension must be at least 1");
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let store = Arc::new(FileCorpusStore::open(config.data_dir.join("corpus.jsonl")).await?);
    let embedder = Arc::new(LocalEmbedding::new(config.embedding_dimension));
    let engine = RecallEngine::new(store, embedder, config.engine);

    let response = match cli.command {
        Commands::Ingest {
            file,
            url,
            title,
            dwell,
        } => {
            let raw = read_input(&file).await?;
            let title = title.unwrap_or_else(|| url.clone());
            let document = engine.record_visit(&url, &title, &raw, dwell).await?;
            info!(id = %document.id, "Ingest complete");
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                println!(
                    "Stored {} ({} passage(s), {} visit(s))",
                    document.url,
                    document.passages.len(),
                    document.visit_count
                );
            }
            return Ok(());
        }
        Commands::Search { query, mode, k } => {
            engine
                .try_handle(EngineRequest::Search { query, mode, k })
                .await?
        }
        Commands::Context { query, top_k } => {
            engine
                .try_handle(EngineRequest::Retrieve {
                    query,
                    top_k,
                    min_similarity: None,
                    max_per_document: None,
                    max_per_domain: None,
                    quality_weight: None,
                })
                .await?
        }
        Commands::Chunk { file } => {
            let content = read_input(&file).await?;
            engine.try_handle(EngineRequest::Chunk { content }).await?
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    Ok(())
}

async fn read_input(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", path.display(), e))
}

fn print_response(response: &EngineResponse) {
    match response {
        EngineResponse::Results { results } => {
            if results.is_empty() {
                println!("No matching pages.");
                return;
            }
            for (i, r) in results.iter().enumerate() {
                println!("{:>2}. {} [{:?}, {:.4}]", i + 1, r.title, r.confidence, r.fused_score);
                println!("    {}", r.url);
                if !r.matched_terms.is_empty() {
                    println!("    matched: {}", r.matched_terms.join(", "));
                }
            }
        }
        EngineResponse::Sources { sources, context } => {
            if sources.is_empty() {
                println!("No relevant passages.");
            } else {
                println!("{context}");
            }
        }
        EngineResponse::Passages { passages } => {
            for p in passages {
                println!(
                    "--- passage {} ({} words, quality {:.2})",
                    p.position, p.word_count, p.quality
                );
                println!("{}", p.text);
            }
            println!("\nTotal: {} passage(s)", passages.len());
        }
        EngineResponse::Error { message } => {
            eprintln!("error: {message}");
        }
    }
}
