//! # Old Timer CLI (`oldtimer`)
//!
//! ## Usage
//!
//! ```bash
//! oldtimer [--config ./config/oldtimer.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oldtimer serve` | Start the HTTP chat server |
//! | `oldtimer ask "<question>"` | Run the pipeline once and print the answer |
//! | `oldtimer check` | Validate configuration and resolve the vector index |
//!
//! Credentials are read from `OPENAI_API_KEY`, `PINECONE_API_KEY` and
//! `PINECONE_INDEX`; a `.env` file in the working directory is loaded first.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use oldtimer::config::{self, Config};
use oldtimer::pinecone;
use oldtimer::pipeline::{check_dimensions, Pipeline};
use oldtimer::{logging, server};

/// Old Timer: baseball trivia answered from a vector knowledge base in a
/// folksy historian's voice.
#[derive(Parser)]
#[command(
    name = "oldtimer",
    about = "Old Timer: a retrieval-augmented baseball trivia chat service",
    version
)]
struct Cli {
    /// Path to a configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `POST [server].chat_path`
    /// and `GET /health`.
    Serve,

    /// Answer a single question from the command line.
    Ask {
        /// The question to ask.
        question: String,

        /// Also print the retrieved passages with their scores.
        #[arg(long)]
        show_context: bool,
    },

    /// Validate configuration and resolve the vector index.
    ///
    /// Confirms that credentials are present, looks the index up on the
    /// control plane, and compares its dimension with `embedding.dims`.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = config::load_config(cli.config.as_deref())?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Ask {
            question,
            show_context,
        } => run_ask(&cfg, &question, show_context).await?,
        Commands::Check => run_check(&cfg).await?,
    }

    Ok(())
}

async fn run_ask(cfg: &Config, question: &str, show_context: bool) -> Result<()> {
    let pipeline = Pipeline::from_config(cfg).await?;
    let outcome = pipeline
        .ask(question)
        .await
        .map_err(|e| anyhow!("{} ({})", e.public_message(), e))?;

    if show_context {
        if outcome.passages.is_empty() {
            println!("(no passages retrieved)");
        }
        for (i, p) in outcome.passages.iter().enumerate() {
            println!("{}. [{:.3}] {}", i + 1, p.score, p.text);
        }
        println!();
    }

    println!("{}", outcome.answer);
    Ok(())
}

async fn run_check(cfg: &Config) -> Result<()> {
    let name = cfg
        .index_name()
        .ok_or_else(|| anyhow!("{} is not set", config::PINECONE_INDEX_VAR))?;

    println!("embedding model:  {}", cfg.embedding.model);
    println!("generation model: {}", cfg.generation.model);
    println!("on failure:       {:?}", cfg.generation.on_failure);
    println!("index:            {} (top_k = {})", name, cfg.index.top_k);

    match cfg.index.host.as_deref() {
        Some(host) => println!("index host:       {} (configured)", host),
        None => {
            let description =
                pinecone::describe_index(&cfg.index, &cfg.credentials.pinecone_api_key, name)
                    .await?;
            println!("index host:       {} ({})", description.host, description.name);
            match description.dimension {
                Some(d) => println!("index dimension:  {}", d),
                None => println!("index dimension:  unknown"),
            }
            if let Some(metric) = &description.metric {
                println!("index metric:     {}", metric);
            }
            println!(
                "index state:      {} (ready: {})",
                description.state(),
                description.is_ready()
            );
            check_dimensions(cfg.embedding.dims, description.dimension)?;
        }
    }

    println!("ok");
    Ok(())
}
