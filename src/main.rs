use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vidsearch::Result;
use vidsearch::commands::{
    cleanup_index, rebuild_index, search, show_config, show_status, validate_index,
};
use vidsearch::config::Config;

#[derive(Parser)]
#[command(name = "vidsearch")]
#[command(about = "Semantic indexing and retrieval for a video catalog")]
#[command(version)]
struct Cli {
    /// Override the configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index from a catalog snapshot
    Rebuild {
        /// Path to the catalog snapshot (JSON array)
        #[arg(long)]
        catalog: PathBuf,
        /// Rebuild even if the index is fresh
        #[arg(long)]
        force: bool,
    },
    /// Search the catalog
    Search {
        /// The query text
        query: String,
        /// Path to the catalog snapshot, used for keyword fallback
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Show index staleness and size
    Status,
    /// Run read-only index health checks
    Validate,
    /// Remove every entry from the vector index
    Cleanup {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config_dir {
        Some(dir) => Config::load(dir)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Rebuild { catalog, force } => {
            rebuild_index(&config, &catalog, force).await?;
        }
        Commands::Search { query, catalog } => {
            search(&config, &query, &catalog).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Validate => {
            validate_index(&config).await?;
        }
        Commands::Cleanup { yes } => {
            cleanup_index(&config, yes).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}
