use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{AppContext, IngestOptions, MatchOptions};
use config::AppConfig;
use flags::{CollectionFlag, RebuildTarget};
use jobmatch_vector_store::paths::DATA_DIR_NAME;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

mod commands;
mod config;
mod flags;
mod input;

#[derive(Parser)]
#[command(name = "jobmatch")]
#[command(about = "Two-stage resume to job matching over versioned embedding snapshots", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding tables, snapshots and drift history
    #[arg(long, global = true, default_value = DATA_DIR_NAME)]
    data_dir: PathBuf,

    /// TOML configuration file ([store], [ingest], [matcher], [drift])
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest role anchors from a JSONL file
    #[command(name = "ingest-anchors")]
    IngestAnchors(IngestArgs),

    /// Ingest job postings for one ingestion month from a JSONL file
    #[command(name = "ingest-postings")]
    IngestPostings(IngestPostingsArgs),

    /// Build and publish new ANN snapshots
    Rebuild(RebuildArgs),

    /// Match a resume embedding against anchors, then postings
    Match(MatchArgs),

    /// Retire partitions older than the retention window and rebuild postings
    Retire(RetireArgs),

    /// Republish the previous snapshot of a collection
    Rollback(RollbackArgs),

    /// Drift statistics across ingestion cycles
    #[command(subcommand)]
    Drift(DriftCommands),

    /// Show collections, snapshots, partitions and rebuild health
    Status,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Commands::IngestAnchors(_) => "ingest-anchors",
            Commands::IngestPostings(_) => "ingest-postings",
            Commands::Rebuild(_) => "rebuild",
            Commands::Match(_) => "match",
            Commands::Retire(_) => "retire",
            Commands::Rollback(_) => "rollback",
            Commands::Drift(DriftCommands::Record { .. }) => "drift record",
            Commands::Drift(DriftCommands::Compare { .. }) => "drift compare",
            Commands::Drift(DriftCommands::Scan { .. }) => "drift scan",
            Commands::Drift(DriftCommands::Distribution { .. }) => "drift distribution",
            Commands::Status => "status",
        }
    }
}

#[derive(Args)]
struct IngestArgs {
    /// JSONL file, one record per line
    path: PathBuf,

    /// Lines are text documents embedded locally instead of records with embeddings
    #[arg(long)]
    text: bool,

    /// Documents embedded per batch with --text
    #[arg(long, default_value_t = 256)]
    batch_size: usize,

    /// Rebuild the collection's snapshot after ingesting
    #[arg(long)]
    rebuild: bool,
}

impl IngestArgs {
    fn options(&self) -> IngestOptions<'_> {
        IngestOptions {
            path: &self.path,
            text: self.text,
            batch_size: self.batch_size,
            rebuild: self.rebuild,
        }
    }
}

#[derive(Args)]
struct IngestPostingsArgs {
    #[command(flatten)]
    ingest: IngestArgs,

    /// Partition tag for the batch, e.g. 2026-01
    #[arg(long)]
    month: String,
}

#[derive(Args)]
struct RebuildArgs {
    #[arg(value_enum, default_value = "all")]
    target: RebuildTarget,
}

#[derive(Args)]
struct MatchArgs {
    /// JSON file with the resume embedding (array, or object with "resume_embedding")
    query: PathBuf,

    /// Resume text for the keyword-overlap signal
    #[arg(long)]
    resume_text: Option<String>,

    /// Search postings globally instead of only within the top categories
    #[arg(long)]
    unrestricted: bool,

    /// Categories kept from stage 1
    #[arg(long)]
    top_categories: Option<usize>,

    /// Postings per category in stage 2
    #[arg(long)]
    top_jobs: Option<usize>,

    /// Results returned
    #[arg(long)]
    global_top: Option<usize>,
}

#[derive(Args)]
struct RetireArgs {
    /// Current month, e.g. 2026-03
    #[arg(long)]
    month: String,

    /// Retention window in months (defaults to ingest.retention_window_months)
    #[arg(long)]
    window: Option<u32>,
}

#[derive(Args)]
struct RollbackArgs {
    #[arg(value_enum)]
    collection: CollectionFlag,
}

#[derive(Subcommand)]
enum DriftCommands {
    /// Record per-category statistics for the postings of one month
    Record {
        #[arg(long)]
        month: String,
    },

    /// Compare two recorded months of one category
    Compare {
        #[arg(long)]
        category: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },

    /// Compare every category recorded in a month with its previous cycle
    Scan {
        #[arg(long)]
        month: String,
    },

    /// Share of postings per category with a collection priority
    Distribution {
        /// Restrict to one ingestion month
        #[arg(long)]
        month: Option<String>,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    status: &'static str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn emit(envelope: &Envelope<'_>, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let command = cli.command.name();
    let pretty = cli.pretty;
    match run(cli).await {
        Ok(data) => emit(
            &Envelope {
                status: "ok",
                command,
                data: Some(data),
                message: None,
            },
            pretty,
        ),
        Err(err) => {
            log::error!("{command} failed: {err:#}");
            emit(
                &Envelope {
                    status: "error",
                    command,
                    data: None,
                    message: Some(format!("{err:#}")),
                },
                pretty,
            )?;
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<Value> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let ctx = AppContext {
        data_dir: cli.data_dir,
        config,
    };

    match cli.command {
        Commands::IngestAnchors(args) => commands::run_ingest_anchors(&ctx, args.options()).await,
        Commands::IngestPostings(args) => {
            commands::run_ingest_postings(&ctx, args.ingest.options(), &args.month).await
        }
        Commands::Rebuild(args) => commands::run_rebuild(&ctx, args.target).await,
        Commands::Match(args) => {
            commands::run_match(
                &ctx,
                MatchOptions {
                    query: &args.query,
                    resume_text: args.resume_text.clone(),
                    unrestricted: args.unrestricted,
                    top_categories: args.top_categories,
                    top_jobs: args.top_jobs,
                    global_top: args.global_top,
                },
            )
            .await
        }
        Commands::Retire(args) => commands::run_retire(&ctx, &args.month, args.window).await,
        Commands::Rollback(args) => commands::run_rollback(&ctx, args.collection).await,
        Commands::Drift(DriftCommands::Record { month }) => {
            commands::run_drift_record(&ctx, &month).await
        }
        Commands::Drift(DriftCommands::Compare { category, from, to }) => {
            commands::run_drift_compare(&ctx, &category, &from, &to).await
        }
        Commands::Drift(DriftCommands::Scan { month }) => {
            commands::run_drift_scan(&ctx, &month).await
        }
        Commands::Drift(DriftCommands::Distribution { month }) => {
            commands::run_drift_distribution(&ctx, month.as_deref()).await
        }
        Commands::Status => commands::run_status(&ctx).await,
    }
}
