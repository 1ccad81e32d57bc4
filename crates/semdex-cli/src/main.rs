//! Semdex CLI
//!
//! Command-line interface for building, watching and querying the
//! semantic index.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use semdex_core::EngineConfig;
use semdex_indexer::{IncrementalIndexer, IndexerOptions, Storage};
use semdex_search::{ConceptGroups, EntryType, QueryEngine, SearchOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "semdex")]
#[command(about = "Semdex - semantic code search with incremental indexing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the index for a project
    Index {
        /// Project path (default: current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Search the index
    Search(SearchArgs),

    /// Show all recorded references to a term
    Refs {
        /// The term to look up
        term: String,

        /// Project path (default: current directory)
        #[arg(long, default_value = ".")]
        path: String,
    },

    /// Show impact analysis for a term
    Impact {
        /// The term to analyze
        term: String,

        /// Project path (default: current directory)
        #[arg(long, default_value = ".")]
        path: String,
    },

    /// Watch a project and keep the index fresh
    Watch {
        /// Project path (default: current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Check index integrity against the hash tree
    Check {
        /// Project path (default: current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Discard the index and rebuild from scratch
    Rebuild {
        /// Project path (default: current directory)
        #[arg(default_value = ".")]
        path: String,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Query pattern: words, a|b, a&b, !a, /regex/, or a concept group
    pattern: String,

    /// Project path (default: current directory)
    #[arg(long, default_value = ".")]
    path: String,

    /// Filter by entry type (function, class, variable, ...)
    #[arg(long = "type")]
    entry_types: Vec<String>,

    /// Filter by file-path substring
    #[arg(long = "files")]
    files: Vec<String>,

    /// Maximum number of results
    #[arg(long, default_value_t = 100)]
    max: usize,

    /// Only match the exact term
    #[arg(long)]
    exact: bool,

    /// Treat the pattern as a regular expression
    #[arg(long)]
    regex: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Simple logging for CLI
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Index { path } => cmd_index(&path).await,
        Commands::Search(args) => cmd_search(args).await,
        Commands::Refs { term, path } => cmd_refs(&term, &path).await,
        Commands::Impact { term, path } => cmd_impact(&term, &path).await,
        Commands::Watch { path } => cmd_watch(&path).await,
        Commands::Check { path } => cmd_check(&path).await,
        Commands::Rebuild { path } => cmd_rebuild(&path).await,
    }
}

fn build_indexer(path: &str, config: &EngineConfig) -> Result<IncrementalIndexer> {
    let root = PathBuf::from(path)
        .canonicalize()
        .with_context(|| format!("Project path not found: {}", path))?;

    let options = IndexerOptions {
        patterns: config.patterns.clone(),
        max_file_size: config.max_file_size,
        debounce_duration: Duration::from_millis(config.debounce_ms),
    };

    Ok(IncrementalIndexer::new(
        &root,
        options,
        Storage::new(config.data_dir.clone()),
    ))
}

/// Load persisted state and bring it up to date, or build from scratch.
async fn open_fresh(indexer: &IncrementalIndexer) -> Result<()> {
    if indexer.initialize().await {
        indexer.refresh().await?;
    } else {
        indexer.build_index().await?;
    }
    Ok(())
}

async fn cmd_index(path: &str) -> Result<()> {
    let config = EngineConfig::load();
    let indexer = build_indexer(path, &config)?;

    indexer.initialize().await;
    let summary = indexer.build_index().await?;

    println!(
        "Indexed {} files: {} entries, {} references ({}ms)",
        summary.files, summary.entries, summary.references, summary.duration_ms
    );
    Ok(())
}

async fn cmd_search(args: SearchArgs) -> Result<()> {
    let config = EngineConfig::load();
    let indexer = build_indexer(&args.path, &config)?;
    open_fresh(&indexer).await?;

    let mut types = Vec::new();
    for name in &args.entry_types {
        match EntryType::from_name(name) {
            Some(ty) => types.push(ty),
            None => bail!("Unknown entry type: {}", name),
        }
    }

    let options = SearchOptions {
        entry_types: types,
        files: args.files,
        max_results: args.max,
        exact: args.exact,
        regex: args.regex,
    };

    let engine = QueryEngine::new(ConceptGroups::with_overrides(&config.groups));
    let index = indexer.index();
    let guard = index.read();

    match engine.evaluate(&guard, &args.pattern, &options) {
        Ok(results) => {
            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }

            for result in &results {
                let usage = match result.usage_count {
                    Some(count) => format!(" ({} uses)", count),
                    None => String::new(),
                };
                println!(
                    "{}:{} [{}] {}{}",
                    result.entry.location.file.display(),
                    result.entry.location.line,
                    result.entry.entry_type.name(),
                    result.entry.term,
                    usage
                );
                if !result.entry.context.is_empty() {
                    println!("    {}", result.entry.context.trim());
                }
            }
            println!("{} result(s).", results.len());
        }
        Err(e) => {
            println!("No results.");
            eprintln!("Query error: {}", e);
        }
    }

    Ok(())
}

async fn cmd_refs(term: &str, path: &str) -> Result<()> {
    let config = EngineConfig::load();
    let indexer = build_indexer(path, &config)?;
    open_fresh(&indexer).await?;

    let index = indexer.index();
    let references = index.read().references(term);

    if references.is_empty() {
        println!("No references to '{}'.", term);
        return Ok(());
    }

    for reference in &references {
        println!(
            "{}:{} [{:?}] {}",
            reference.from.file.display(),
            reference.from.line,
            reference.kind,
            reference.context.trim()
        );
    }
    println!("{} reference(s).", references.len());

    Ok(())
}

async fn cmd_impact(term: &str, path: &str) -> Result<()> {
    let config = EngineConfig::load();
    let indexer = build_indexer(path, &config)?;
    open_fresh(&indexer).await?;

    let index = indexer.index();
    let impact = index.read().impact(term);

    println!(
        "'{}': {} reference(s) across {} file(s)",
        impact.term, impact.total_references, impact.referencing_files
    );
    for (kind, count) in &impact.by_kind {
        println!("  {:?}: {}", kind, count);
    }
    for sample in &impact.samples {
        println!(
            "  e.g. {}:{} {}",
            sample.from.file.display(),
            sample.from.line,
            sample.context.trim()
        );
    }

    Ok(())
}

async fn cmd_watch(path: &str) -> Result<()> {
    let config = EngineConfig::load();
    let indexer = Arc::new(build_indexer(path, &config)?);
    open_fresh(&indexer).await?;

    indexer.start_watching()?;
    println!("Watching {} (Ctrl+C to stop)", indexer.root().display());

    tokio::signal::ctrl_c().await?;

    indexer.stop_watching();
    println!("Stopped.");

    Ok(())
}

async fn cmd_check(path: &str) -> Result<()> {
    let config = EngineConfig::load();
    let indexer = build_indexer(path, &config)?;

    if !indexer.initialize().await {
        println!("No persisted index; run `semdex index` first.");
        return Ok(());
    }

    let report = indexer.check_integrity();
    println!(
        "Tree tracks {} file(s); index covers {} file(s).",
        report.tracked_files, report.indexed_files
    );

    if report.is_consistent() {
        println!("Index is consistent.");
        return Ok(());
    }

    for path in &report.missing_from_index {
        println!("  missing from index: {}", path.display());
    }
    for path in &report.orphaned_in_index {
        println!("  orphaned in index:  {}", path.display());
    }
    println!("Run `semdex rebuild` to repair.");

    Ok(())
}

async fn cmd_rebuild(path: &str) -> Result<()> {
    let config = EngineConfig::load();
    let indexer = build_indexer(path, &config)?;

    indexer.initialize().await;
    let summary = indexer.force_rebuild().await?;

    println!(
        "Rebuilt {} files: {} entries, {} references ({}ms)",
        summary.files, summary.entries, summary.references, summary.duration_ms
    );
    Ok(())
}
