//! Defectscan CLI
//!
//! Command-line interface for:
//! - Analyzing survey documents (`.txt`, `.md`, `.docx`, `.pdf` with the `pdf` feature)
//! - Inspecting or exporting the effective defect taxonomy
//! - Browsing, summarising and deleting analyses persisted to a store directory

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use defectscan_core::{
    clean_text, extract_file, AnalysisSummary, Capabilities, DefectEngine, DisabledSignal,
    DocumentAnalysis, EngineConfig, ExtractionError, SecondarySignal, Taxonomy,
};
use defectscan_storage::{file_sha256, AnalysisId, AnalysisMetadata, AnalysisStore};

mod output;
#[cfg(feature = "sentiment-http")]
mod sentiment;

/// Documents with less cleaned text than this are rejected before classification.
const MIN_DOCUMENT_CHARS: usize = 50;

#[derive(Parser)]
#[command(name = "defectscan")]
#[command(author, version, about = "Defect detection for building-survey documents")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a document and classify defect mentions
    Analyze {
        /// Input document
        input: PathBuf,
        /// Engine config (.toml or .json); built-in taxonomy if omitted
        #[arg(long, env = "DEFECTSCAN_CONFIG")]
        config: Option<PathBuf>,
        /// Sentiment service URL; enables the secondary signal
        #[arg(long, env = "DEFECTSCAN_SENTIMENT_URL")]
        sentiment_url: Option<String>,
        /// Per-sentence timeout for the sentiment service
        #[arg(long, default_value_t = 2000)]
        sentiment_timeout_ms: u64,
        /// Print JSON instead of the human-readable report
        #[arg(long)]
        json: bool,
        /// Also write the JSON report to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Persist the analysis into this store directory
        #[arg(long, env = "DEFECTSCAN_STORE")]
        store: Option<PathBuf>,
        /// Store even if the same file was analysed before
        #[arg(long)]
        force: bool,
        /// Skip header/footer cleaning
        #[arg(long)]
        no_clean: bool,
    },

    /// Print the effective engine configuration
    Taxonomy {
        #[arg(long, env = "DEFECTSCAN_CONFIG")]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },

    /// List stored analyses, newest first
    History {
        #[arg(long, env = "DEFECTSCAN_STORE")]
        store: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Show one stored analysis
    Show {
        /// Analysis id
        id: String,
        #[arg(long, env = "DEFECTSCAN_STORE")]
        store: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Delete one stored analysis
    Delete {
        /// Analysis id
        id: String,
        #[arg(long, env = "DEFECTSCAN_STORE")]
        store: PathBuf,
    },

    /// Totals across the store
    Stats {
        #[arg(long, env = "DEFECTSCAN_STORE")]
        store: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Toml,
    Json,
}

/// JSON report for `analyze`
#[derive(Serialize)]
struct AnalyzeReport<'a> {
    file: String,
    capabilities: Capabilities,
    summary: AnalysisSummary,
    #[serde(flatten)]
    analysis: &'a DocumentAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_id: Option<AnalysisId>,
}

fn init_tracing(verbosity: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_taxonomy(path: Option<&Path>) -> Result<Taxonomy> {
    load_config(path)?
        .compile()
        .context("invalid engine configuration")
}

/// Build the secondary signal. Failures here degrade to rule-based only.
fn build_signal(url: Option<&str>, timeout: Duration) -> Arc<dyn SecondarySignal> {
    match url {
        Some(url) => sentiment_signal(url, timeout),
        None => Arc::new(DisabledSignal),
    }
}

#[cfg(feature = "sentiment-http")]
fn sentiment_signal(url: &str, timeout: Duration) -> Arc<dyn SecondarySignal> {
    use defectscan_core::SentimentSignal;

    match sentiment::HttpSentimentModel::new(url, timeout) {
        Ok(model) => Arc::new(SentimentSignal::new(model, timeout)),
        Err(err) => {
            tracing::warn!(error = %err, "sentiment service unavailable; rule-based only");
            Arc::new(DisabledSignal)
        }
    }
}

#[cfg(not(feature = "sentiment-http"))]
fn sentiment_signal(url: &str, _timeout: Duration) -> Arc<dyn SecondarySignal> {
    tracing::warn!(url, "built without `sentiment-http`; ignoring --sentiment-url");
    Arc::new(DisabledSignal)
}

/// Set on Ctrl-C; the engine returns what it has so far.
fn abort_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    if let Err(err) = signal_hook::flag::register(signal_hook::consts::SIGINT, flag.clone()) {
        tracing::warn!(error = %err, "could not install interrupt handler");
    }
    flag
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    input: &Path,
    config: Option<&Path>,
    sentiment_url: Option<&str>,
    sentiment_timeout: Duration,
    json: bool,
    out: Option<&Path>,
    store_dir: Option<&Path>,
    force: bool,
    no_clean: bool,
) -> Result<()> {
    let taxonomy = load_taxonomy(config)?;

    let raw = extract_file(input).with_context(|| format!("extracting {}", input.display()))?;
    let text = if no_clean { raw } else { clean_text(&raw) };
    let chars = text.chars().count();
    if chars < MIN_DOCUMENT_CHARS {
        let err = ExtractionError::InsufficientText {
            chars,
            min: MIN_DOCUMENT_CHARS,
        };
        return Err(anyhow::Error::new(err).context(input.display().to_string()));
    }

    let engine = DefectEngine::new(taxonomy, build_signal(sentiment_url, sentiment_timeout));
    let abort = abort_flag();
    let analysis = engine.analyze_document(&text, &abort);
    let summary = AnalysisSummary::from_findings(&analysis.findings);
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input.display().to_string());

    let analysis_id = match store_dir {
        Some(dir) => store_analysis(dir, input, &filename, chars, &analysis, &summary, force)?,
        None => None,
    };

    let report = AnalyzeReport {
        file: filename.clone(),
        capabilities: engine.capabilities(),
        summary,
        analysis: &analysis,
        analysis_id,
    };

    if let Some(path) = out {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_analysis(&filename, &analysis);
        if let Some(id) = analysis_id {
            println!("{} {}", "stored".green().bold(), id.to_string().cyan());
        }
    }
    Ok(())
}

fn store_analysis(
    dir: &Path,
    input: &Path,
    filename: &str,
    chars: usize,
    analysis: &DocumentAnalysis,
    summary: &AnalysisSummary,
    force: bool,
) -> Result<Option<AnalysisId>> {
    let store = AnalysisStore::open(dir)?;
    let hash = file_sha256(input)?;

    if !force {
        if let Some(previous) = store.find_by_hash(&hash)? {
            eprintln!(
                "{} {} was already analysed as {} (use --force to store again)",
                "info:".yellow().bold(),
                filename,
                previous.id.to_string().cyan()
            );
            return Ok(Some(previous.id));
        }
    }

    let metadata = AnalysisMetadata {
        filename: filename.to_string(),
        file_hash: Some(hash),
        text_chars: chars,
        processing_method: summary.processing_method.clone(),
    };
    Ok(Some(store.store(&analysis.findings, metadata)?))
}

fn cmd_taxonomy(config: Option<&Path>, format: ConfigFormat) -> Result<()> {
    // Compile first so a broken file is reported rather than echoed back.
    let taxonomy = load_taxonomy(config)?;
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(taxonomy.config())?,
        ConfigFormat::Json => serde_json::to_string_pretty(taxonomy.config())?,
    };
    println!("{rendered}");
    Ok(())
}

fn cmd_history(store: &Path, json: bool) -> Result<()> {
    let records = AnalysisStore::open(store)?.list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        output::print_history(&records);
    }
    Ok(())
}

fn parse_id(id: &str) -> Result<AnalysisId> {
    id.parse()
        .map_err(|e| anyhow!("invalid analysis id `{id}`: {e}"))
}

fn cmd_show(id: &str, store: &Path, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    let record = AnalysisStore::open(store)?.load(id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        output::print_record(&record);
    }
    Ok(())
}

fn cmd_delete(id: &str, store: &Path) -> Result<()> {
    let id = parse_id(id)?;
    let record = AnalysisStore::open(store)?.delete(id)?;
    println!(
        "{} {} ({})",
        "deleted".red().bold(),
        id.to_string().cyan(),
        record.metadata.filename
    );
    Ok(())
}

fn cmd_stats(store: &Path, json: bool) -> Result<()> {
    let stats = AnalysisStore::open(store)?.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        output::print_stats(&stats);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Analyze {
            input,
            config,
            sentiment_url,
            sentiment_timeout_ms,
            json,
            out,
            store,
            force,
            no_clean,
        } => {
            if sentiment_timeout_ms == 0 {
                bail!("--sentiment-timeout-ms must be positive");
            }
            cmd_analyze(
                &input,
                config.as_deref(),
                sentiment_url.as_deref(),
                Duration::from_millis(sentiment_timeout_ms),
                json,
                out.as_deref(),
                store.as_deref(),
                force,
                no_clean,
            )
        }
        Commands::Taxonomy { config, format } => cmd_taxonomy(config.as_deref(), format),
        Commands::History { store, json } => cmd_history(&store, json),
        Commands::Show { id, store, json } => cmd_show(&id, &store, json),
        Commands::Delete { id, store } => cmd_delete(&id, &store),
        Commands::Stats { store, json } => cmd_stats(&store, json),
    }
}
