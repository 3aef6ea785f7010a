//! Delve CLI - Command-line interface for Delve
//!
//! Runs recursive web research on a topic and writes the resulting report or answer

use clap::{Parser, Subcommand};
use delve_core::{
    config_error, init_logging, log_operation_error, log_operation_start, log_operation_success,
    DelveConfig, DelveError, DelveResult, ErrorContext, LearningSet,
};
use delve_research::{
    DeepResearch, OutputMode, ProgressSender, ResearchProgress, DEFAULT_QUESTION_COUNT,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Recursive web research that ends in a written report")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic and write a report or an exact answer
    Research {
        /// Topic or question to research
        topic: String,

        /// Queries planned at the first level
        #[arg(short, long, default_value = "4")]
        breadth: usize,

        /// Levels of follow-up research
        #[arg(short, long, default_value = "2")]
        depth: usize,

        /// Output mode (report, answer)
        #[arg(short, long, default_value = "report")]
        mode: OutputMode,

        /// Output file (defaults to report.md or answer.md)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print clarifying questions for a topic
    Questions {
        /// Topic to clarify
        topic: String,

        /// Maximum number of questions
        #[arg(long, default_value_t = DEFAULT_QUESTION_COUNT)]
        count: usize,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> DelveResult<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
        logging_config.filter_directives.clear();
    }
    init_logging(&logging_config).map_err(|e| DelveError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check the [logging] section of the configuration"),
    })?;

    info!("Starting Delve CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Research {
            topic,
            breadth,
            depth,
            mode,
            output,
        } => {
            handle_research(topic, breadth, depth, mode, output, &config).await?;
        }
        Commands::Questions { topic, count } => {
            handle_questions(topic, count, &config).await?;
        }
        Commands::Config {
            show,
            init,
            validate,
        } => {
            handle_config(show, init, validate, cli.config.as_ref())?;
        }
    }

    Ok(())
}

/// Load configuration from `config_path` or the first default location that
/// exists, then apply environment overrides
fn load_config(config_path: Option<&PathBuf>) -> DelveResult<DelveConfig> {
    let mut config = if let Some(path) = config_path {
        DelveConfig::from_file(path)?
    } else {
        let default_paths = [
            Some(default_config_path()),
            dirs::home_dir().map(|d| d.join(".delve").join("config.toml")),
            Some(PathBuf::from("delve.toml")),
        ];

        match default_paths.into_iter().flatten().find(|path| path.exists()) {
            Some(path) => DelveConfig::from_file(&path)?,
            None => DelveConfig::default(),
        }
    };

    config.apply_env_overrides();
    Ok(config)
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("delve")
        .join("config.toml")
}

fn research_setup(
    config: &DelveConfig,
    progress: Option<ProgressSender>,
) -> DelveResult<DeepResearch> {
    config.validate()?;
    config.require_credentials()?;

    let mut builder = DeepResearch::builder(config);
    if let Some(sender) = progress {
        builder = builder.with_progress(sender);
    }
    builder.build()
}

async fn handle_research(
    topic: String,
    breadth: usize,
    depth: usize,
    mode: OutputMode,
    output: Option<PathBuf>,
    config: &DelveConfig,
) -> DelveResult<()> {
    log_operation_start!("cli_research", breadth = breadth, depth = depth);

    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let research = research_setup(config, Some(sender))?;

    println!("🔍 Researching: {}", topic);
    let bar = progress_bar();
    let watcher = tokio::spawn(track_progress(receiver, bar.clone()));

    let result = research.run_research(&topic, breadth, depth).await;
    watcher.abort();
    bar.finish_and_clear();

    let LearningSet {
        learnings,
        visited_urls,
    } = result.inspect_err(|e| log_operation_error!("cli_research", e))?;

    if learnings.is_empty() {
        println!("🤷 No results: the research produced no learnings for this topic.");
        log_operation_success!("cli_research", learnings = 0usize);
        return Ok(());
    }

    println!(
        "📚 Collected {} learnings from {} sources",
        learnings.len(),
        visited_urls.len()
    );

    let document = match mode {
        OutputMode::Report => {
            println!("📝 Writing report...");
            research.build_report(&topic, &learnings, &visited_urls).await
        }
        OutputMode::Answer => {
            println!("🎯 Writing answer...");
            research.final_answer(&topic, &learnings).await
        }
    };

    let path = output.unwrap_or_else(|| PathBuf::from(mode.file_name()));
    tokio::fs::write(&path, &document).await?;

    println!("✅ Saved to {}", path.display());
    log_operation_success!(
        "cli_research",
        learnings = learnings.len(),
        urls = visited_urls.len()
    );
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Drive `bar` from research events: each planned query adds to the
/// total, each finished one advances it
async fn track_progress(mut receiver: UnboundedReceiver<ResearchProgress>, bar: ProgressBar) {
    while let Some(event) = receiver.recv().await {
        match event {
            ResearchProgress::Planned { queries, .. } => {
                bar.inc_length(queries.len() as u64);
            }
            ResearchProgress::QueryStarted { depth, query } => {
                bar.set_message(format!("depth {}: {}", depth, query));
            }
            ResearchProgress::QueryCompleted { .. } => bar.inc(1),
            ResearchProgress::QueryFailed { query, kind, .. } => {
                bar.println(format!("⚠️  '{}' failed ({})", query, kind));
                bar.inc(1);
            }
        }
    }
}

async fn handle_questions(topic: String, count: usize, config: &DelveConfig) -> DelveResult<()> {
    let research = research_setup(config, None)?;
    let questions = research.clarifying_questions(&topic, count).await?;

    if questions.is_empty() {
        println!("🤷 No clarifying questions for this topic.");
        return Ok(());
    }

    println!("❓ Questions to narrow down \"{}\":", topic);
    for (index, question) in questions.iter().enumerate() {
        println!("  {}. {}", index + 1, question);
    }
    Ok(())
}

fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    config_path: Option<&PathBuf>,
) -> DelveResult<()> {
    if init {
        let path = config_path.cloned().unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        DelveConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {}", path.display());
        println!("📝 API keys are read from OPENAI_KEY and FIRECRAWL_KEY.");
    }

    if show {
        let config = load_config(config_path)?;
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| config_error!(format!("Failed to render config: {}", e), "cli"))?;
        println!("📋 Current configuration:");
        println!("{}", rendered);
    }

    if validate {
        let config = load_config(config_path)?;
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}
