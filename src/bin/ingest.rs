use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use georgia_qa::config::Settings;
use georgia_qa::indexer::chunker::split_sections;
use georgia_qa::knowledge::GEORGIAN_HISTORY;
use georgia_qa::rag::RagEngine;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Embed the knowledge text and store it in the vector database")]
struct Args {
    /// Text file to ingest instead of the built-in Georgian history
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Qdrant server URL
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Qdrant collection name
    #[arg(long, env = "QDRANT_COLLECTION_NAME")]
    collection: Option<String>,

    /// Print the chunks without calling any external service
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut settings = Settings::load()?;
    if let Some(url) = args.qdrant_url {
        settings.qdrant.url = url;
    }
    if let Some(collection) = args.collection {
        settings.qdrant.collection = collection;
    }

    let text = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => GEORGIAN_HISTORY.to_string(),
    };

    let chunks = split_sections(&text, settings.rag.max_chunk_chars, settings.rag.chunk_overlap);
    println!("Split text into {} chunks", chunks.len());

    if args.dry_run {
        for chunk in &chunks {
            let tokens = chunk
                .token_count
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("[{}] {} chars, {} tokens", chunk.id, chunk.char_len, tokens);
        }
        return Ok(());
    }

    println!("Connecting to Qdrant at {}...", settings.qdrant.url);
    let engine = RagEngine::connect(&settings).await?;

    let stored = engine.ingest(&chunks).await?;

    println!("\nIngestion complete!");
    println!("  Chunks stored: {}", stored);
    println!("  Collection:    {}", settings.qdrant.collection);
    println!("  Qdrant URL:    {}", settings.qdrant.url);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parses_dry_run() {
        let args = Args::try_parse_from(["ingest", "--dry-run", "--file", "notes.txt"]).unwrap();
        assert!(args.dry_run);
        assert_eq!(args.file, Some(PathBuf::from("notes.txt")));
    }
}
