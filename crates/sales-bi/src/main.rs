use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use sales_bi::chat::run_chat;
use sales_bi::config::IndexBackend;
use sales_bi::embeddings::{load_embeddings, EmbeddingModel};
use sales_bi::processing::{convert_to_csv, load_records};
use sales_bi::{
    BiConfig, MemoryIndex, OpenAiGenerator, PineconeIndex, QueryRouter, SemanticIndex,
};

#[derive(Parser)]
#[command(name = "sales-bi")]
#[command(about = "Ask business questions about sales data", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an Excel workbook to CSV
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Keep a reproducible sample of this many rows
        #[arg(long)]
        sample: Option<usize>,
    },
    /// Embed the sales data and upsert it into the Pinecone index
    Index,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Convert {
            input,
            output,
            sample,
        }) => {
            let summary = convert_to_csv(&input, &output, sample)
                .with_context(|| format!("Failed to convert {}", input.display()))?;
            println!(
                "Wrote {} of {} rows ({} columns) to {}",
                summary.written,
                summary.rows,
                summary.columns,
                output.display()
            );
            Ok(())
        }
        Some(Commands::Index) => index().await,
        None => chat().await,
    }
}

fn load_config() -> Result<BiConfig> {
    BiConfig::load()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")
}

async fn index() -> Result<()> {
    let config = load_config()?;
    let store = load_records(&config.data_path, config.loader.sample_size).with_context(|| {
        format!("Failed to load sales data from {}", config.data_path.display())
    })?;
    let embeddings: Arc<dyn EmbeddingModel> = Arc::from(load_embeddings(&config.embedding));

    let index = PineconeIndex::connect(&config.pinecone, embeddings)
        .await
        .context("Failed to connect to Pinecone")?;
    let upserted = index
        .upsert_store(&store, config.pinecone.batch_size, config.pinecone.sample_size)
        .await
        .context("Failed to upsert records to Pinecone")?;

    println!("Indexed {} records into '{}'", upserted, config.pinecone.index_name);
    Ok(())
}

async fn chat() -> Result<()> {
    let config = load_config()?;
    let store = load_records(&config.data_path, config.loader.sample_size).with_context(|| {
        format!("Failed to load sales data from {}", config.data_path.display())
    })?;
    tracing::info!(records = store.len(), "Sales data loaded");

    let embeddings: Arc<dyn EmbeddingModel> = Arc::from(load_embeddings(&config.embedding));

    let index: Arc<dyn SemanticIndex> = match config.search.backend {
        IndexBackend::Memory => Arc::new(
            MemoryIndex::build(&store, embeddings).context("Failed to build the search index")?,
        ),
        // Populated separately by `sales-bi index`.
        IndexBackend::Pinecone => Arc::new(
            PineconeIndex::connect(&config.pinecone, embeddings)
                .await
                .context("Failed to connect to Pinecone")?,
        ),
    };

    let generator = Arc::new(
        OpenAiGenerator::new(&config.llm).context("Failed to set up the LLM client")?,
    );
    let router = QueryRouter::new(store, index, generator, config.router_config());

    println!("🔍 BI Chatbot Ready! Ask a question about the sales data (type 'exit' to quit).");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_chat(stdin.lock(), &mut stdout, &router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_starts_chat() {
        let cli = Cli::try_parse_from(["sales-bi"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_index_subcommand() {
        let cli = Cli::try_parse_from(["sales-bi", "index"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Index)));
    }

    #[test]
    fn test_convert_subcommand_with_sample() {
        let cli =
            Cli::try_parse_from(["sales-bi", "convert", "raw.xlsx", "out.csv", "--sample", "500"])
                .unwrap();
        match cli.command {
            Some(Commands::Convert {
                input,
                output,
                sample,
            }) => {
                assert_eq!(input, PathBuf::from("raw.xlsx"));
                assert_eq!(output, PathBuf::from("out.csv"));
                assert_eq!(sample, Some(500));
            }
            _ => panic!("expected convert"),
        }
    }
}
