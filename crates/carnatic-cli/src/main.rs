//! Carnatic CLI - Command-line interface for the Carnatic music assistant.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use carnatic_assistant::{read_records, Assistant, Components, Handle, ToolReport};
use carnatic_core::{AssistantConfig, Category, ToolCall, ToolId, ToolParams};
use carnatic_models::{MockEmbedder, MockLanguageModel, MockRelevanceModel};
use carnatic_query::ToolSelector;
use carnatic_store::SqliteStore;

/// Carnatic - question answering over a Carnatic music knowledge base
#[derive(Parser)]
#[command(name = "carnatic")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: user config dir, then ./carnatic.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use mock models instead of the ONNX files and the chat API
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Import pre-chunked content from a JSON Lines file
    Import {
        /// File with one {"text", "category", "source", ...} record per line
        path: PathBuf,

        /// Chunks embedded per batch
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// List the retrieval tools
    Tools,

    /// Show which tools a question would be routed to
    Select {
        /// Question text
        question: String,
    },

    /// Run one category search tool
    Search {
        /// knowledge_tool, raga_index_tool or krithi_tool
        tool: String,

        /// Search query
        query: String,
    },

    /// Search several categories and fuse the results
    MultiSearch {
        /// Search query
        query: String,

        /// Category to search (repeatable; all if not specified)
        #[arg(short = 'C', long = "category")]
        categories: Vec<String>,

        /// Candidates kept per category
        #[arg(short, long)]
        k_each: Option<usize>,
    },

    /// Answer a question with the language model
    Ask {
        /// Question text
        question: String,

        /// Critique and refine the answer
        #[arg(short, long)]
        review: bool,
    },

    /// Show per-category statistics
    Stats,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false);

    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = builder.with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

fn load_config(cli: &Cli) -> Result<AssistantConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => AssistantConfig::load(path)?,
        None => AssistantConfig::load_default()?,
    };
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init => {
            init_database(&config)?;
        }
        Commands::Import { path, batch_size } => {
            let handle = open_handle(&config, cli.mock, false)?;
            let batch_size = batch_size.unwrap_or(config.embedding.batch_size);
            import(&handle, &path, batch_size).await?;
            handle.shutdown()?;
        }
        Commands::Tools => {
            for tool in ToolId::ALL {
                println!("{:<16} {}", tool.name(), tool.description());
            }
        }
        Commands::Select { question } => {
            let selector = ToolSelector::new(config.selection.clone());
            let calls = selector.select(&question);
            println!("{}", serde_json::to_string_pretty(&calls)?);
        }
        Commands::Search { tool, query } => {
            let tool: ToolId = tool.parse()?;
            let assistant = Assistant::new(open_handle(&config, cli.mock, false)?);
            let call = ToolCall {
                tool,
                params: ToolParams::Search { query },
            };
            let report = assistant.run_tool(&call).await;
            print_report(&report);
            assistant.into_handle().shutdown()?;
        }
        Commands::MultiSearch {
            query,
            categories,
            k_each,
        } => {
            let categories = if categories.is_empty() {
                Category::all_ids()
            } else {
                categories
            };
            let assistant = Assistant::new(open_handle(&config, cli.mock, false)?);
            let call = ToolCall {
                tool: ToolId::MultiSearch,
                params: ToolParams::MultiSearch {
                    query,
                    categories,
                    k_each: k_each.unwrap_or(config.selection.fusion_k_each),
                },
            };
            let report = assistant.run_tool(&call).await;
            print_report(&report);
            assistant.into_handle().shutdown()?;
        }
        Commands::Ask { question, review } => {
            let assistant = Assistant::new(open_handle(&config, cli.mock, true)?);
            ask(&assistant, &question, review).await;
            assistant.into_handle().shutdown()?;
        }
        Commands::Stats => {
            let handle = open_handle(&config, cli.mock, false)?;
            let stats = handle.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            handle.shutdown()?;
        }
    }

    Ok(())
}

fn init_database(config: &AssistantConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let store = SqliteStore::open_with_config(&config.database, config.embedding.dimension)?;
    store.checkpoint()?;
    println!("Initialized database at: {}", db_path.display());
    Ok(())
}

/// Build a handle from the real models, or from mocks sized like them.
fn open_handle(
    config: &AssistantConfig,
    mock: bool,
    with_llm: bool,
) -> Result<Handle, Box<dyn std::error::Error>> {
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            eprintln!(
                "Database directory does not exist. Run 'carnatic init' first, or specify a path with -d."
            );
            std::process::exit(1);
        }
    }

    if !mock {
        let handle = if with_llm {
            Handle::init(config)?
        } else {
            Handle::init_retrieval(config)?
        };
        return Ok(handle);
    }

    let embedding = &config.embedding;
    let components = Components {
        store: Arc::new(SqliteStore::open_with_config(
            &config.database,
            embedding.dimension,
        )?),
        embedder: Arc::new(MockEmbedder::with_config(
            embedding.dimension,
            embedding.max_tokens,
        )),
        relevance: Arc::new(MockRelevanceModel::new()),
        llm: if with_llm {
            Some(Arc::new(MockLanguageModel::new(
                "Mock answer: no language model was consulted.",
            )))
        } else {
            None
        },
    };

    Ok(Handle::with_components(config.clone(), components)?)
}

async fn import(
    handle: &Handle,
    path: &Path,
    batch_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let chunks = read_records(BufReader::new(file))?;

    if chunks.is_empty() {
        println!("No records found in: {}", path.display());
        return Ok(());
    }

    println!("Importing {} chunk(s) from {}...", chunks.len(), path.display());
    let stored = handle.import(&chunks, batch_size).await?;
    println!("Complete: {} chunks stored", stored);

    Ok(())
}

fn print_report(report: &ToolReport) {
    if report.is_error() {
        eprintln!("{}", report.render());
        std::process::exit(1);
    }
    println!("{}", report.render());
}

async fn ask(assistant: &Assistant, question: &str, review: bool) {
    if !review {
        println!("{}", assistant.answer_text(question).await);
        return;
    }

    match assistant.answer_reviewed(question).await {
        Ok(reviewed) => {
            println!("{}", reviewed.review.refined);
            eprintln!("\n--- Critique ---\n{}", reviewed.review.critique);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
