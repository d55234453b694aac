//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use answerbank_core::{Pipeline, ProgressReporter, RunSummary, build_connector, scrape};
use answerbank_shared::{AppConfig, Question, init_config, load_config, validate_credentials};
use answerbank_storage::Dataset;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// answerbank: keep an interview-question dataset answered and up to date.
#[derive(Parser)]
#[command(
    name = "answerbank",
    version,
    about = "Scrape interview questions, answer new ones, and merge them into a JSONL dataset.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./answerbank.toml, then ~/.answerbank/answerbank.toml).
    #[arg(long, global = true, env = "ANSWERBANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch new questions, answer them, backfill pending ones, and merge.
    Run {
        /// Dataset file (overrides `[dataset] path`).
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Also write the run summary as JSON to this path.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Answer pending (null-answer) records without fetching.
    Fill {
        #[arg(long)]
        dataset: Option<PathBuf>,

        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Fetch and list new questions without answering or writing.
    Scrape {
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Print candidates as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Inspect the dataset file.
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Dataset subcommands.
#[derive(Subcommand)]
pub(crate) enum DatasetAction {
    /// Print record counts.
    Stats {
        #[arg(long)]
        dataset: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
    /// Fail unless the file is in canonical sorted form.
    Check {
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Where to write it (defaults to ~/.answerbank/answerbank.toml).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "answerbank=info",
        1 => "answerbank=debug",
        _ => "answerbank=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Command::Run {
            dataset,
            summary_json,
        } => cmd_run(config_path, dataset, summary_json.as_deref(), false).await,
        Command::Fill {
            dataset,
            summary_json,
        } => cmd_run(config_path, dataset, summary_json.as_deref(), true).await,
        Command::Scrape { dataset, json } => cmd_scrape(config_path, dataset, json).await,
        Command::Dataset { action } => match action {
            DatasetAction::Stats { dataset, json } => cmd_dataset_stats(config_path, dataset, json),
            DatasetAction::Check { dataset } => cmd_dataset_check(config_path, dataset),
        },
        Command::Config { action } => match action {
            ConfigAction::Init { path } => cmd_config_init(path.as_deref()),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    };

    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    result
}

fn dataset_path(config: &AppConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&config.dataset.path))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    dataset: Option<PathBuf>,
    summary_json: Option<&Path>,
    fill_only: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    // Fail before touching the network when the LLM key is absent.
    validate_credentials(&config)?;

    let path = dataset_path(&config, dataset);
    let pipeline = Pipeline::from_config(&config)?.with_dataset_path(&path);

    info!(
        dataset = %path.display(),
        sources = config.sources.len(),
        fill_only,
        "starting"
    );

    let reporter = CliProgress::new();
    let outcome = if fill_only {
        pipeline.fill(&reporter).await
    } else {
        pipeline.run(&reporter).await
    };
    reporter.spinner.finish_and_clear();
    let summary = outcome?;

    if let Some(out) = summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(out, format!("{json}\n"))
            .wrap_err_with(|| format!("writing summary to {}", out.display()))?;
    }

    print_summary(&summary);
    Ok(())
}

async fn cmd_scrape(config_path: Option<&Path>, dataset: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let path = dataset_path(&config, dataset);
    let connector = build_connector(&config)?;

    let report = scrape(&connector, &path).await?;

    if json {
        for question in &report.new {
            println!("{}", serde_json::to_string(&candidate_json(question))?);
        }
        return Ok(());
    }

    println!();
    println!("  Fetched: {}", report.fetch.questions.len());
    println!("  Known:   {}", report.known);
    println!("  New:     {}", report.new.len());
    for (source, err) in &report.fetch.errors {
        println!("  Failed source {source}: {err}");
    }
    println!();
    for question in &report.new {
        println!("  {}  {}", question.id, question.text);
    }
    Ok(())
}

fn candidate_json(question: &Question) -> serde_json::Value {
    serde_json::json!({
        "id": question.id,
        "question": question.text,
        "origin": question.source.origin,
        "link": question.source.link,
    })
}

fn cmd_dataset_stats(config_path: Option<&Path>, dataset: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let path = dataset_path(&config, dataset);
    let stats = Dataset::load(&path)?.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  Dataset:  {}", path.display());
    println!("  Total:    {}", stats.total);
    println!("  Answered: {}", stats.answered);
    println!("  Pending:  {}", stats.pending);
    for (method, count) in &stats.by_method {
        println!("    {method}: {count}");
    }
    println!("  Sources:");
    for (origin, count) in &stats.by_origin {
        println!("    {origin}: {count}");
    }
    println!();
    Ok(())
}

fn cmd_dataset_check(config_path: Option<&Path>, dataset: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let path = dataset_path(&config, dataset);

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("{}: no dataset yet", path.display());
            return Ok(());
        }
        Err(e) => return Err(eyre!("reading {}: {e}", path.display())),
    };

    let dataset = Dataset::parse(&path, &raw)?;
    if !dataset.is_canonical(&raw)? {
        return Err(eyre!(
            "{} is not in canonical form ({} records, {} duplicate lines); run `answerbank fill` or `answerbank run` to rewrite it",
            path.display(),
            dataset.len(),
            dataset.duplicate_lines()
        ));
    }

    println!("{}: ok ({} records)", path.display(), dataset.len());
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = init_config(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Fetched:    {}", summary.fetched);
    println!("  New:        {}", summary.new);
    println!("  Backfilled: {}", summary.backfilled);
    println!("  Answered:   {}", summary.answered);
    println!("  Failed:     {}", summary.failed.len());
    if summary.abandoned > 0 || summary.timed_out {
        println!("  Abandoned:  {} (timed out)", summary.abandoned);
    }
    for failure in &summary.sources_failed {
        println!("  Source {} failed: {}", failure.source, failure.error);
    }
    if let Some(write) = &summary.write {
        println!(
            "  Dataset:    {} ({} inserted, {} updated, {} total, {})",
            write.path.display(),
            write.inserted,
            write.updated,
            write.total,
            if write.changed { "changed" } else { "unchanged" }
        );
    }
    println!("  Time:       {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_done(&self, question: &Question, ok: bool, current: usize, total: usize) {
        let mark = if ok { "ok" } else { "failed" };
        self.spinner
            .set_message(format!("Answering [{current}/{total}] {mark}: {}", question.text));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
