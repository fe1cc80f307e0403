//! # courier-cli
//!
//! Binary entry point for Courier.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Logging setup (terminal plus a timestamped log file)
//! - The `run` command hosting a send session on a blocking thread
//! - Snapshot inspection and backup via `courier stats` and `courier backup`

mod report;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use courier_adapters::build_submitter;
use courier_core::{
    CourierConfig, CsvRoster, EventRecord, FanoutSink, RetryDispatcher, SessionController,
    SessionRecorder, SessionSettings, SessionSummary, StatsStore, StopCause, Template, TimeLimit,
    TracingSink,
};
use courier_proto::{EventSink, Roster};
use std::fs::{self, File};
use std::io::{BufWriter, IsTerminal, stdout};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Directory that receives one log file per run.
const LOG_DIR: &str = "logs";

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// ANSI color codes for terminal output.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
    pub const CYAN: &str = "\x1b[36m";
}

/// Courier - paced, resumable templated outreach campaigns
#[derive(Parser, Debug)]
#[command(name = "courier", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────

    /// Path to configuration file
    #[arg(short, long, default_value = "courier.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,

    /// Do not write a log file under logs/
    #[arg(long, global = true)]
    no_log_file: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a send session (default if no subcommand given)
    Run(RunArgs),

    /// Print the statistics of the current snapshot
    Stats,

    /// Copy the statistics snapshot to a position-tagged backup
    Backup,

    /// Write a default configuration and an empty message template
    Init,
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug, Default)]
struct RunArgs {
    /// Stop after this many successful sends (-1 for no limit)
    #[arg(long, allow_negative_numbers = true)]
    max_messages: Option<i64>,

    /// Stop after this much running time, e.g. "90s", "1h30m" or "-1"
    #[arg(long, allow_hyphen_values = true)]
    max_time: Option<String>,

    /// Log messages instead of submitting them
    #[arg(long)]
    dry_run: bool,

    /// Record every session event as JSONL to this file
    #[arg(long, value_name = "PATH")]
    record_events: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, config: &mut CourierConfig) {
        if let Some(max_messages) = self.max_messages {
            config.max_messages = max_messages;
        }
        if let Some(max_time) = &self.max_time {
            config.max_time = TimeLimit::Text(max_time.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default()));
    let log_file = matches!(command, Commands::Run(_)) && !cli.no_log_file;
    init_logging(cli.verbose, log_file)?;

    match command {
        Commands::Run(args) => run_command(&cli.config, cli.color, args).await,
        Commands::Stats => stats_command(&cli.config, cli.color),
        Commands::Backup => backup_command(&cli.config),
        Commands::Init => init_command(&cli.config),
    }
}

fn init_logging(verbose: bool, log_file: bool) -> Result<()> {
    let filter = if verbose { "debug" } else { "info" };

    let file_layer = if log_file {
        fs::create_dir_all(LOG_DIR).context("Failed to create log directory")?;
        let path = Path::new(LOG_DIR).join(format!(
            "{}.log",
            Local::now().format("%Y-%m-%d_%H-%M-%S")
        ));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn load_config(config_path: &Path) -> Result<CourierConfig> {
    if config_path.exists() {
        CourierConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))
    } else {
        warn!("Config file {} not found, using defaults", config_path.display());
        Ok(CourierConfig::default())
    }
}

async fn run_command(config_path: &Path, color_mode: ColorMode, args: RunArgs) -> Result<()> {
    let use_colors = color_mode.should_use_colors();

    let mut config = load_config(config_path)?;
    args.apply(&mut config);

    let (settings, warnings) = config
        .validate()
        .context("Configuration validation failed")?;
    for warning in &warnings {
        eprintln!("{warning}");
    }

    let message = fs::read_to_string(&settings.message_file).with_context(|| {
        format!(
            "Failed to read message template {}",
            settings.message_file.display()
        )
    })?;
    let template = Template::new(message);

    let roster = CsvRoster::from_path(&settings.roster_file, &settings.id_column)
        .with_context(|| format!("Failed to load roster {}", settings.roster_file.display()))?;
    info!(
        rows = roster.len(),
        valid = roster.valid_count(),
        "Loaded roster {}",
        settings.roster_file.display()
    );
    if !roster.repairs().is_empty() {
        roster.save_repairs(&settings.repairs_file).with_context(|| {
            format!(
                "Failed to write repair report {}",
                settings.repairs_file.display()
            )
        })?;
        warn!(
            repairs = roster.repairs().len(),
            "Roster ids repaired, see {}",
            settings.repairs_file.display()
        );
    }

    let mut fanout = FanoutSink::new().with(Arc::new(TracingSink));
    let recorder = match &args.record_events {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create event recording {}", path.display()))?;
            let recorder = Arc::new(SessionRecorder::new(BufWriter::new(file)));
            recorder.record_meta(EventRecord::new(
                "_meta.session",
                serde_json::json!({
                    "config": config_path.display().to_string(),
                    "dry_run": settings.dry_run,
                    "started_at": Local::now().to_rfc3339(),
                }),
            ));
            fanout.add(recorder.clone());
            Some(recorder)
        }
        None => None,
    };
    let sink: Arc<dyn EventSink> = Arc::new(fanout);

    let interrupted = Arc::new(AtomicBool::new(false));
    install_signal_handlers(&interrupted);

    let budget = settings.budget;
    let handle = Handle::current();
    let summary = tokio::task::spawn_blocking(move || {
        run_session(&settings, roster, template, handle, sink, interrupted)
    })
    .await
    .context("Send session task failed")??;

    if let Some(recorder) = recorder
        && let Err(e) = recorder.flush()
    {
        warn!("Failed to flush event recording: {}", e);
    }

    print_termination(&summary, use_colors);
    print!(
        "{}",
        report::statistics_report(&summary.statistics, Some(&budget), use_colors)
    );

    let exit_code = summary.cause.exit_code();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Runs the session to completion on the current (blocking) thread.
fn run_session(
    settings: &SessionSettings,
    roster: CsvRoster,
    template: Template,
    handle: Handle,
    sink: Arc<dyn EventSink>,
    interrupted: Arc<AtomicBool>,
) -> Result<SessionSummary> {
    let submitter = build_submitter(settings, handle, sink.clone());
    let dispatcher = RetryDispatcher::new(submitter, settings.budget, sink.clone())
        .with_subject(settings.subject.as_deref().map(Template::new));
    let store = StatsStore::new(&settings.stats_file);

    let mut session = SessionController::new(dispatcher, roster, store, template, sink)
        .with_reset_interval(settings.reset_interval)
        .with_interrupt(interrupted);
    debug!(dry_run = settings.dry_run, "Starting send session");
    session.run().context("Send session failed")
}

/// Sets `interrupted` on SIGINT or SIGTERM.
///
/// The session finishes the record in flight and stops before the next one.
fn install_signal_handlers(interrupted: &Arc<AtomicBool>) {
    let interrupted_sigint = Arc::clone(interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received (SIGINT), finishing current record...");
            interrupted_sigint.store(true, Ordering::SeqCst);
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let interrupted_sigterm = Arc::clone(interrupted);
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::spawn(async move {
                    sigterm.recv().await;
                    warn!("SIGTERM received, finishing current record...");
                    interrupted_sigterm.store(true, Ordering::SeqCst);
                });
            }
            Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
        }
    }
}

fn stats_command(config_path: &Path, color_mode: ColorMode) -> Result<()> {
    let config = load_config(config_path)?;
    let store = StatsStore::new(&config.stats_file);
    let Some(stats) = store
        .try_load()
        .with_context(|| format!("Failed to read {}", store.path().display()))?
    else {
        bail!(
            "No statistics snapshot at {}. Use `courier run` to start a session.",
            store.path().display()
        );
    };

    // Remaining limits are only shown when the configuration is usable.
    let budget = config.validate().ok().map(|(settings, _)| settings.budget);
    print!(
        "{}",
        report::statistics_report(&stats, budget.as_ref(), color_mode.should_use_colors())
    );
    Ok(())
}

fn backup_command(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = StatsStore::new(&config.stats_file);
    let backup = store
        .backup()
        .with_context(|| format!("Failed to back up {}", store.path().display()))?;
    println!("Backed up {} to {}", store.path().display(), backup.display());
    Ok(())
}

fn init_command(config_path: &Path) -> Result<()> {
    let config = CourierConfig::default();

    if config_path.exists() {
        println!("{} already exists, leaving it unchanged", config_path.display());
    } else {
        let yaml = config.to_yaml().context("Failed to serialize default config")?;
        fs::write(config_path, yaml)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Created {}", config_path.display());
    }

    if config.message_file.exists() {
        println!(
            "{} already exists, leaving it unchanged",
            config.message_file.display()
        );
    } else {
        fs::write(&config.message_file, "")
            .with_context(|| format!("Failed to write {}", config.message_file.display()))?;
        println!("Created {}", config.message_file.display());
    }

    println!(
        "Set `submitter.command` and `roster_file` in {} before running `courier run`.",
        config_path.display()
    );
    Ok(())
}

fn print_termination(summary: &SessionSummary, use_colors: bool) {
    use colors::{BOLD, CYAN, GREEN, RESET, YELLOW};

    let (color, icon) = match summary.cause {
        StopCause::RosterExhausted => (GREEN, "✓"),
        StopCause::MaxTime { .. } | StopCause::MaxMessages { .. } => (YELLOW, "⚠"),
        StopCause::Interrupted => (YELLOW, "⚡"),
    };
    let label = summary.cause.to_string();
    let stats = &summary.statistics;

    let separator = "─".repeat(58);

    if use_colors {
        println!("\n{BOLD}┌{separator}┐{RESET}");
        println!("{BOLD}│{RESET} {color}{BOLD}{icon}{RESET} Session stopped: {color}{label}{RESET}");
        println!("{BOLD}├{separator}┤{RESET}");
        println!(
            "{BOLD}│{RESET}   Records:     {CYAN}{}{RESET}",
            summary.records_processed
        );
        println!(
            "{BOLD}│{RESET}   Sent:        {CYAN}{}{RESET}",
            stats.messages_sent
        );
        println!(
            "{BOLD}│{RESET}   Failed:      {CYAN}{}{RESET}",
            stats.messages_failed
        );
        println!(
            "{BOLD}│{RESET}   Position:    {CYAN}{}{RESET}",
            stats.current_position
        );
        println!("{BOLD}└{separator}┘{RESET}");
    } else {
        println!("\n+{}+", "-".repeat(58));
        println!("| {icon} Session stopped: {label}");
        println!("+{}+", "-".repeat(58));
        println!("|   Records:     {}", summary.records_processed);
        println!("|   Sent:        {}", stats.messages_sent);
        println!("|   Failed:      {}", stats.messages_failed);
        println!("|   Position:    {}", stats.current_position);
        println!("+{}+", "-".repeat(58));
    }
}
