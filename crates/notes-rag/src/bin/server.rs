//! Study notes web server
//!
//! Run with: cargo run -p notes-rag --bin notes-rag-server -- --notes ./notes

use clap::Parser;
use notes_rag::{config::RagConfig, server::RagServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "notes-rag-server", version, about = "Web chat over a folder of PDF study notes")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "NOTES_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the PDF notes
    #[arg(short, long)]
    notes: Option<PathBuf>,

    /// Directory for the persisted index
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notes_rag=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                  Study Notes Assistant                    ║
║        Ask questions about your PDF study notes           ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let mut config = RagConfig::load(args.config.as_deref())?;
    if let Some(notes) = args.notes {
        config.notes.directory = notes;
    }
    if let Some(index) = args.index {
        config.vector_db.persist_dir = index;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Notes directory: {}", config.notes.directory.display());
    tracing::info!("  - Index directory: {}", config.vector_db.persist_dir.display());
    tracing::info!("  - Embedding model: {}", config.embeddings.model_id());
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);
    if config.llm.enabled && config.llm.api_key.is_none() {
        tracing::warn!("No Gemini API key set (GEMINI_API_KEY); answers will show raw notes");
    }

    let server = RagServer::new(config);

    println!("\nServer starting...");
    println!("  Chat: http://{}/", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
