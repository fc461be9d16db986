//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use account_sweeper::blueprint::BlueprintOptions;
use account_sweeper::core::config::{Config, TypeSelection};
use account_sweeper::core::errors::SweepError;
use account_sweeper::logger::activity::{
    ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use account_sweeper::orchestrator::{RunOptions, Sweeper};
use account_sweeper::report::{EXIT_ABORTED, EXIT_CONFIG, EXIT_OK, RunOutcome, RunReport};
use account_sweeper::resource::inventory::Inventory;
use account_sweeper::scanner::pipeline::{ClassifiedResource, ScanResult};
use account_sweeper::scheduler::cancel::CancelToken;
use account_sweeper::scheduler::clock::SystemClock;
use account_sweeper::scheduler::gate::StdinPrompter;
use account_sweeper::scheduler::record::LifecycleState;
use account_sweeper::signals::SignalHandler;

/// Filter-driven cloud account cleanup.
#[derive(Debug, Parser)]
#[command(
    name = "sweep",
    author,
    version,
    about = "Account Sweeper - remove everything your filters do not protect",
    long_about = None
)]
pub struct Cli {
    /// Config file path.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Inventory snapshot describing the account (JSON).
    #[arg(long, global = true, value_name = "PATH")]
    inventory: Option<PathBuf>,
    /// Only consider these resource types (repeatable).
    #[arg(short = 't', long = "target", global = true, value_name = "TYPE")]
    targets: Vec<String>,
    /// Never consider these resource types (repeatable).
    #[arg(short = 'e', long = "exclude", global = true, value_name = "TYPE")]
    excludes: Vec<String>,
    /// Actually remove resources. Without this only a report is produced.
    #[arg(long, global = true)]
    no_dry_run: bool,
    /// Skip the typed confirmation; wait --force-sleep seconds instead.
    #[arg(long, global = true)]
    force: bool,
    /// Seconds to wait before removal under --force (default: config, 15).
    #[arg(long, global = true, value_name = "SECONDS")]
    force_sleep: Option<u64>,
    /// Abort after N consecutive sweeps without progress (0 = never).
    #[arg(long, global = true, value_name = "N")]
    max_wait_retries: Option<u32>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Show attempts and error codes per resource.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Hide filtered resources.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute (defaults to `run`).
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan the account and remove every unprotected resource.
    Run,
    /// Emit a config that protects everything currently present.
    Blueprint(BlueprintArgs),
    /// List the resource types known to the inventory.
    ResourceTypes,
    /// Load and validate the config.
    Validate,
    /// Generate shell completions.
    Completions(CompletionsArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct BlueprintArgs {
    /// Append already-protected resources as comments.
    #[arg(short = 'f', long)]
    include_filtered: bool,
    /// Label generated filters with resource names.
    #[arg(short = 'n', long)]
    include_name: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Configuration, bootstrap, or runtime failure from the library.
    #[error("{0}")]
    Sweep(#[from] SweepError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Sweep(SweepError::Cancelled { .. }) => EXIT_ABORTED,
            Self::User(_) | Self::Sweep(_) | Self::Json(_) | Self::Io(_) => EXIT_CONFIG,
        }
    }
}

/// Dispatch CLI commands. Returns the process exit status.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        None | Some(Command::Run) => run_sweep(cli),
        Some(Command::Blueprint(args)) => run_blueprint(cli, args),
        Some(Command::ResourceTypes) => run_resource_types(cli),
        Some(Command::Validate) => run_validate(cli),
        Some(Command::Completions(args)) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(EXIT_OK)
        }
        Some(Command::Version(args)) => emit_version(cli, args),
    }
}

// ──────────────────── shared setup ────────────────────

fn require_path<'a>(path: Option<&'a PathBuf>, flag: &str) -> Result<&'a Path, CliError> {
    path.map(PathBuf::as_path)
        .ok_or_else(|| CliError::User(format!("{flag} is required for this command")))
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let path = require_path(cli.config.as_ref(), "--config")?;
    Ok(Config::load(path)?)
}

fn load_inventory(cli: &Cli) -> Result<Inventory, CliError> {
    let path = require_path(cli.inventory.as_ref(), "--inventory")?;
    Ok(Inventory::load(path)?)
}

fn run_options(cli: &Cli) -> RunOptions {
    RunOptions {
        dry_run: !cli.no_dry_run,
        force: cli.force,
        force_sleep: cli.force_sleep.map(Duration::from_secs),
        max_wait_retries: cli.max_wait_retries,
        overrides: TypeSelection {
            targets: cli.targets.clone(),
            excludes: cli.excludes.clone(),
        },
    }
}

/// Activity logger for the run, if the config names a log file.
struct LoggerGuard {
    handle: Option<ActivityLoggerHandle>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl LoggerGuard {
    fn start(config: &Config) -> Result<Self, CliError> {
        let Some(path) = &config.logging.activity_log else {
            return Ok(Self {
                handle: None,
                join: None,
            });
        };
        let (handle, join) = spawn_logger(ActivityLoggerConfig::new(path))?;
        Ok(Self {
            handle: Some(handle),
            join: Some(join),
        })
    }

    fn handle(&self) -> Option<&ActivityLoggerHandle> {
        self.handle.as_ref()
    }
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

// ──────────────────── run ────────────────────

fn run_sweep(cli: &Cli) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let inventory = load_inventory(cli)?;
    let mode = output_mode(cli);

    let cancel = CancelToken::new();
    let signals = SignalHandler::install(&cancel);
    let clock = SystemClock::new();
    let logger = LoggerGuard::start(&config)?;

    let sweeper = Sweeper::new(
        &config,
        inventory.account.clone(),
        &inventory.registry,
        run_options(cli),
        &clock,
        signals.token(),
    )?
    .with_logger(logger.handle());

    let scan = sweeper.scan();
    report_scan_failures(&scan);
    if !sweeper.options().dry_run {
        // The classification precedes the prompt; stdout stays clean for JSON.
        match mode {
            OutputMode::Human => print_scan(cli, &scan, &mut io::stdout().lock())?,
            OutputMode::Json => print_scan(cli, &scan, &mut io::stderr().lock())?,
        }
    }

    let report = sweeper.execute(scan, &mut StdinPrompter)?;
    match mode {
        OutputMode::Human => print_report(cli, &report)?,
        OutputMode::Json => write_json_line(&serde_json::to_value(&report)?)?,
    }
    Ok(report.exit_code())
}

fn report_scan_failures(scan: &ScanResult) {
    for failure in &scan.failures {
        eprintln!(
            "{} listing {} in {} failed: [{}] {}",
            "warning:".yellow().bold(),
            failure.resource_type,
            failure.region,
            failure.error_code,
            failure.message
        );
    }
}

fn print_scan(cli: &Cli, scan: &ScanResult, out: &mut dyn Write) -> Result<(), CliError> {
    for classified in &scan.resources {
        if cli.quiet && !classified.is_candidate() {
            continue;
        }
        writeln!(out, "{}", scan_line(classified))?;
    }
    writeln!(
        out,
        "Scan complete: {} total, {} removable, {} filtered.\n",
        scan.resources.len(),
        scan.candidate_count(),
        scan.filtered_count()
    )?;
    Ok(())
}

fn scan_line(classified: &ClassifiedResource) -> String {
    let reason = classified.decision.reason.to_string();
    let reason = if classified.is_candidate() {
        reason.cyan().to_string()
    } else {
        reason.yellow().to_string()
    };
    format!("{} - {reason}", classified.resource)
}

fn print_report(cli: &Cli, report: &RunReport) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    for outcome in &report.resources {
        if cli.quiet && outcome.state == LifecycleState::Filtered {
            continue;
        }
        let reason = match outcome.state {
            LifecycleState::Removed => outcome.reason.green().to_string(),
            LifecycleState::Failed => outcome.reason.red().to_string(),
            LifecycleState::Skipped | LifecycleState::Filtered => {
                outcome.reason.yellow().to_string()
            }
            _ => outcome.reason.cyan().to_string(),
        };
        write!(
            stdout,
            "{} - {} - {} - {reason}",
            outcome.region,
            outcome.resource_type,
            outcome.label.as_deref().unwrap_or(&outcome.identifier)
        )?;
        if cli.verbose && outcome.attempts > 0 {
            write!(stdout, " (attempts: {}", outcome.attempts)?;
            if let Some(code) = &outcome.error_code {
                write!(stdout, ", {code}")?;
            }
            write!(stdout, ")")?;
        }
        writeln!(stdout)?;
    }
    writeln!(stdout, "{}", report.summary_line())?;
    if report.outcome == RunOutcome::DryRun && report.counts.pending > 0 {
        writeln!(
            stdout,
            "{}",
            "Dry run: nothing was removed. Pass --no-dry-run to remove.".dimmed()
        )?;
    }
    if !report.succeeded() {
        writeln!(
            stdout,
            "{} run ended {} (exit {})",
            "error:".red().bold(),
            report.outcome.as_str(),
            report.exit_code()
        )?;
    }
    Ok(())
}

// ──────────────────── blueprint ────────────────────

fn run_blueprint(cli: &Cli, args: &BlueprintArgs) -> Result<i32, CliError> {
    let path = require_path(cli.config.as_ref(), "--config")?;
    let config = Config::load_as_written(path)?;
    let inventory = load_inventory(cli)?;
    let cancel = CancelToken::new();
    let clock = SystemClock::new();
    let options = RunOptions {
        dry_run: true,
        ..run_options(cli)
    };
    let sweeper = Sweeper::new(
        &config,
        inventory.account.clone(),
        &inventory.registry,
        options,
        &clock,
        &cancel,
    )?;
    let blueprint = sweeper.blueprint(BlueprintOptions {
        include_filtered: args.include_filtered,
        include_name: args.include_name,
    })?;
    // A blueprint is a config document; only an explicit --json wraps it.
    if cli.json {
        write_json_line(&json!({
            "account": inventory.account.id,
            "blueprint": blueprint,
        }))?;
    } else {
        io::stdout().lock().write_all(blueprint.as_bytes())?;
    }
    Ok(EXIT_OK)
}

// ──────────────────── introspection ────────────────────

fn run_resource_types(cli: &Cli) -> Result<i32, CliError> {
    let inventory = load_inventory(cli)?;
    let names = inventory.registry.names();
    match output_mode(cli) {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            for name in &names {
                writeln!(stdout, "{name}")?;
            }
        }
        OutputMode::Json => write_json_line(&json!(names))?,
    }
    Ok(EXIT_OK)
}

fn run_validate(cli: &Cli) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    if cli.inventory.is_some() {
        let inventory = load_inventory(cli)?;
        config.validate_against(&inventory.registry)?;
    }
    let hash = config.stable_hash()?;
    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} config hash {hash}", "valid:".green().bold());
            println!(
                "{} account(s), {} region(s), {} preset(s)",
                config.accounts.len(),
                config.regions.len(),
                config.presets.len()
            );
        }
        OutputMode::Json => write_json_line(&json!({
            "valid": true,
            "config_hash": hash,
            "accounts": config.accounts.keys().collect::<Vec<_>>(),
            "regions": config.regions,
        }))?,
    }
    Ok(EXIT_OK)
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<i32, CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("sweep {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "sweep",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(EXIT_OK)
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SWEEPER_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "sweep",
            "--config",
            "/tmp/sweep.toml",
            "--json",
            "--no-color",
            "-v",
            "run",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["sweep", "run", "-c", "/tmp/sweep.toml", "--no-dry-run"]);
        assert!(after.is_ok());
    }

    #[test]
    fn run_is_default_command() {
        let cli = Cli::try_parse_from(["sweep", "-c", "cfg.toml"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.no_dry_run);
        assert!(run_options(&cli).dry_run);
    }

    #[test]
    fn repeatable_type_selection() {
        let cli = Cli::try_parse_from([
            "sweep", "-t", "Instance", "-t", "Volume", "-e", "Vpc", "run",
        ])
        .unwrap();
        let options = run_options(&cli);
        assert_eq!(options.overrides.targets, vec!["Instance", "Volume"]);
        assert_eq!(options.overrides.excludes, vec!["Vpc"]);
    }

    #[test]
    fn force_flags_map_to_options() {
        let cli = Cli::try_parse_from([
            "sweep",
            "--no-dry-run",
            "--force",
            "--force-sleep",
            "3",
            "--max-wait-retries",
            "7",
        ])
        .unwrap();
        let options = run_options(&cli);
        assert!(!options.dry_run);
        assert!(options.force);
        assert_eq!(options.force_sleep, Some(Duration::from_secs(3)));
        assert_eq!(options.max_wait_retries, Some(7));
    }

    #[test]
    fn parses_subcommands() {
        let cases = [
            vec!["sweep", "blueprint", "-f", "-n"],
            vec!["sweep", "blueprint", "--include-filtered"],
            vec!["sweep", "resource-types"],
            vec!["sweep", "validate"],
            vec!["sweep", "version", "--verbose"],
        ];
        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["sweep", "-q", "-v"]).is_err());
    }

    #[test]
    fn completions_support_bash_zsh_and_fish() {
        for shell in ["bash", "zsh", "fish"] {
            let parsed = Cli::try_parse_from(["sweep", "completions", shell]);
            assert!(parsed.is_ok(), "failed shell parse for {shell}");
        }
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(resolve_output_mode(true, Some("human"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("json"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("human"), false), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("auto"), true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn config_errors_exit_one() {
        let err = CliError::from(SweepError::AccountBlocked {
            account_id: "1".to_string(),
        });
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert_eq!(CliError::User("x".to_string()).exit_code(), EXIT_CONFIG);
    }
}
