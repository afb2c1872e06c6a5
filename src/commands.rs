use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{CatalogItem, format_duration, load_snapshot};
use crate::config::Config;
use crate::embeddings::{Embedder, GeminiClient};
use crate::index::Indexer;
use crate::maintenance::IndexValidator;
use crate::query::classify;
use crate::retrieve::{RetrieveError, Retriever, fallback_search};
use crate::store::{UpstashClient, VectorIndex};

fn build_store(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let client = UpstashClient::new(&config.vector).context("Failed to create vector store client")?;
    Ok(Arc::new(client))
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let client = GeminiClient::new(&config.embedding).context("Failed to create embedding client")?;
    Ok(Arc::new(client))
}

fn progress_spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    bar
}

/// Rebuild the vector index from a catalog snapshot file.
#[inline]
pub async fn rebuild_index(config: &Config, catalog_path: &Path, force: bool) -> Result<()> {
    if !config.is_pipeline_configured() {
        eprintln!(
            "{}",
            style("Semantic pipeline is not configured; nothing to rebuild.").yellow()
        );
        eprintln!("Set UPSTASH_VECTOR_REST_URL, UPSTASH_VECTOR_REST_TOKEN and GEMINI_API_KEY.");
        return Ok(());
    }

    let catalog = load_snapshot(catalog_path)
        .with_context(|| format!("Failed to load catalog from {}", catalog_path.display()))?;
    info!("Loaded {} catalog items", catalog.len());

    let indexer = Indexer::new(
        build_store(config)?,
        build_embedder(config)?,
        config.indexing.clone(),
        config.rebuild_interval(),
        force || Config::force_rebuild(),
    );

    let bar = progress_spinner(&format!("Rebuilding index for {} items", catalog.len()));
    let outcome = indexer.rebuild(&catalog).await?;
    bar.finish_and_clear();

    if outcome.skipped {
        println!("Index is fresh; rebuild skipped. Use --force to rebuild anyway.");
        return Ok(());
    }

    println!("{}", style("Rebuild complete.").green());
    println!("  Items indexed: {}", outcome.items_indexed);
    if outcome.items_failed > 0 {
        println!(
            "  Items failed: {}",
            style(outcome.items_failed).yellow()
        );
    }
    println!("  Entries upserted: {}", outcome.entries_upserted);

    Ok(())
}

/// Classify a query, run retrieval, and fall back to keyword search when the
/// semantic pipeline is unavailable or finds nothing.
#[inline]
pub async fn search(config: &Config, query: &str, catalog_path: &Path) -> Result<()> {
    let catalog = load_snapshot(catalog_path)
        .with_context(|| format!("Failed to load catalog from {}", catalog_path.display()))?;

    let intent = classify(query);
    eprintln!("Query intent: {}", style(intent.as_str()).cyan());

    let items = if config.is_pipeline_configured() {
        let retriever = Retriever::new(
            build_store(config)?,
            build_embedder(config)?,
            config.retrieval.clone(),
        );

        match retriever.retrieve(query, intent).await {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => {
                eprintln!("No semantic matches; falling back to keyword search.");
                keyword_fallback(config, &catalog, query)
            }
            Err(RetrieveError::Unavailable(reason)) => {
                warn!("Semantic retrieval unavailable: {}", reason);
                eprintln!(
                    "{}",
                    style("Semantic search unavailable; falling back to keyword search.").yellow()
                );
                keyword_fallback(config, &catalog, query)
            }
        }
    } else {
        eprintln!(
            "{}",
            style("Semantic pipeline is not configured; using keyword search.").yellow()
        );
        keyword_fallback(config, &catalog, query)
    };

    if items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("Results ({} total):", items.len());
    println!();
    for item in &items {
        print_item(item);
    }

    Ok(())
}

fn keyword_fallback(config: &Config, catalog: &[CatalogItem], query: &str) -> Vec<CatalogItem> {
    fallback_search(
        catalog,
        query,
        config.retrieval.general_top_k,
        config.retrieval.fallback_min_results,
    )
}

fn print_item(item: &CatalogItem) {
    println!("{} ({})", style(&item.title).bold(), item.id);
    println!(
        "   {} | {} | {} views",
        item.published_at.format("%Y-%m-%d"),
        format_duration(&item.duration),
        item.view_count
    );
    if !item.description.is_empty() {
        let summary: String = item.description.chars().take(120).collect();
        println!("   {}", style(summary).dim());
    }
    println!();
}

/// Show staleness and size information for the index.
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("Index Status").bold().cyan());
    println!();

    if !config.is_pipeline_configured() {
        println!("{}", style("Semantic pipeline: disabled").yellow());
        println!("Set UPSTASH_VECTOR_REST_URL, UPSTASH_VECTOR_REST_TOKEN and GEMINI_API_KEY.");
        return Ok(());
    }

    let indexer = Indexer::new(
        build_store(config)?,
        build_embedder(config)?,
        config.indexing.clone(),
        config.rebuild_interval(),
        false,
    );

    let status = indexer.status().await;

    match status.last_update {
        Some(ts) => println!("  Last rebuild: {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last rebuild: {}", style("never").yellow()),
    }
    println!(
        "  Rebuild due: {}",
        if status.should_update {
            style("yes").yellow()
        } else {
            style("no").green()
        }
    );
    println!("  Total vectors: {}", status.total_vectors);
    println!("  Estimated items: {}", status.estimated_items);

    Ok(())
}

/// Run read-only index health checks.
#[inline]
pub async fn validate_index(config: &Config) -> Result<()> {
    if !config.is_pipeline_configured() {
        eprintln!(
            "{}",
            style("Semantic pipeline is not configured; nothing to validate.").yellow()
        );
        return Ok(());
    }

    let validator = IndexValidator::new(build_store(config)?, config.embedding.dimension);

    let bar = progress_spinner("Validating index");
    let report = validator.validate().await;
    bar.finish_and_clear();

    if report.is_valid {
        println!("{}", style("✓ Index is valid.").green());
    } else {
        println!("{}", style("✗ Index has problems:").red());
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for recommendation in &report.recommendations {
            println!("  - {}", recommendation);
        }
    }

    Ok(())
}

/// Remove every entry from the index, including the rebuild sentinel.
#[inline]
pub async fn cleanup_index(config: &Config, assume_yes: bool) -> Result<()> {
    if !config.is_pipeline_configured() {
        eprintln!(
            "{}",
            style("Semantic pipeline is not configured; nothing to clean up.").yellow()
        );
        return Ok(());
    }

    if !assume_yes {
        let confirmed = Confirm::new()
            .with_prompt("This removes every entry from the vector index. Continue?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let validator = IndexValidator::new(build_store(config)?, config.embedding.dimension);
    validator.cleanup().await.context("Cleanup failed")?;

    println!("{}", style("Index cleaned up.").green());
    println!("The next rebuild will repopulate it from scratch.");

    Ok(())
}

/// Print the active configuration with secrets masked.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  URL: {}", style(mask_option(config.vector.url.as_deref())).cyan());
    eprintln!(
        "  Token: {}",
        style(mask_secret(config.vector.token.as_deref())).cyan()
    );
    eprintln!("  Timeout: {}s", config.vector.timeout_secs);

    eprintln!();
    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!(
        "  API key: {}",
        style(mask_secret(config.embedding.api_key.as_deref())).cyan()
    );
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", config.embedding.dimension);

    eprintln!();
    eprintln!("{}", style("Indexing:").bold().yellow());
    eprintln!(
        "  Rebuild interval: {} minutes",
        config.indexing.rebuild_interval_mins
    );
    eprintln!("  Batch size: {}", config.indexing.batch_size);

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  General: top {} at threshold {}",
        config.retrieval.general_top_k, config.retrieval.general_score_threshold
    );
    eprintln!(
        "  Statistical: top {} at threshold {}",
        config.retrieval.statistical_top_k, config.retrieval.statistical_score_threshold
    );

    eprintln!();
    eprintln!(
        "Pipeline: {}",
        if config.is_pipeline_configured() {
            style("configured").green()
        } else {
            style("disabled").yellow()
        }
    );

    Ok(())
}

fn mask_option(value: Option<&str>) -> String {
    value.unwrap_or("(not set)").to_string()
}

fn mask_secret(value: Option<&str>) -> String {
    match value {
        Some(secret) => {
            let chars: Vec<char> = secret.chars().collect();
            if chars.len() > 4 {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("...{}", tail)
            } else {
                "****".to_string()
            }
        }
        None => "(not set)".to_string(),
    }
}
