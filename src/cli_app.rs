//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use sheet_tiles::core::config::Config;
use sheet_tiles::logger::activity::{ActivityLoggerHandle, spawn_logger, to_log_entry};
use sheet_tiles::logger::diagnostics::{Diagnostic, DiagnosticSink, FanoutSink, MemorySink};
use sheet_tiles::logger::jsonl::Severity;
use sheet_tiles::session::{
    ActorId, DisplayError, DisplaySink, FileSource, NavigationSession, NoRefresh, Notice,
    OpenOutcome, RefreshSource, RenderedUpdate, SessionContext, TransitionKind,
};
use sheet_tiles::tiles::build_from_payload;
use sheet_tiles::tiles::render::{ControlSet, PlatformMessage, render};
use sheet_tiles::tiles::validate::{RowValidator, ValidationRules};

/// Render spreadsheet rows as paginated rich-message tiles.
#[derive(Debug, Parser)]
#[command(
    name = "stiles",
    author,
    version,
    about = "Sheet Tiles - paginated rich messages from spreadsheet rows",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the JSONL activity log path.
    #[arg(long, global = true, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Render one page of a payload.
    Render(RenderArgs),
    /// Validate a payload and list every diagnostic.
    Check(CheckArgs),
    /// Page through a payload interactively on stdin.
    Browse(BrowseArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct RenderArgs {
    /// Payload file, or `-` for stdin.
    #[arg(value_name = "PATH")]
    input: PathBuf,
    /// One-based page to render.
    #[arg(long, default_value_t = 1, value_name = "N")]
    page: usize,
}

#[derive(Debug, Clone, Args)]
struct CheckArgs {
    /// Payload file, or `-` for stdin.
    #[arg(value_name = "PATH")]
    input: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct BrowseArgs {
    /// Payload file; re-read on refresh.
    #[arg(value_name = "PATH")]
    input: PathBuf,
    /// Actor that owns the view.
    #[arg(long, default_value = "local", value_name = "ID")]
    owner: String,
    /// Actor issuing commands when a line names none.
    #[arg(long = "as", value_name = "ID")]
    actor: Option<String>,
    /// Inactivity timeout, overriding the config.
    #[arg(long, value_name = "SECONDS")]
    timeout_secs: Option<u64>,
    /// Do not offer the refresh control.
    #[arg(long)]
    no_refresh: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or unusable payload.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
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
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Render(args) => run_render(cli, args),
        Command::Check(args) => run_check(cli, args),
        Command::Browse(args) => run_browse(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── diagnostics plumbing ────────────────────

/// Memory sink for the command's own summary, fanned out to the JSONL log.
struct Diagnostics {
    memory: Arc<MemorySink>,
    sink: Arc<dyn DiagnosticSink>,
    logger: ActivityLoggerHandle,
    join: JoinHandle<()>,
}

impl Diagnostics {
    fn start(cli: &Cli, config: &Config) -> Result<Self, CliError> {
        let mut logging = config.logging.clone();
        if let Some(path) = &cli.log {
            logging.jsonl_path.clone_from(path);
        }
        let (logger, join) = spawn_logger(&logging).map_err(|e| CliError::Runtime(e.to_string()))?;
        let memory = Arc::new(MemorySink::new());
        let sink: Arc<dyn DiagnosticSink> = Arc::new(
            FanoutSink::new()
                .with(memory.clone())
                .with(Arc::new(logger.clone())),
        );
        Ok(Self {
            memory,
            sink,
            logger,
            join,
        })
    }

    fn validator(&self, config: &Config) -> RowValidator {
        RowValidator::new(ValidationRules::from(&config.tiles), Arc::clone(&self.sink))
    }

    fn finish(self) -> Vec<Diagnostic> {
        self.logger.shutdown();
        let _ = self.join.join();
        self.memory.drain()
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

fn read_input(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    fs::read_to_string(path).map_err(|e| CliError::User(format!("cannot read {}: {e}", path.display())))
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Info => "info".dimmed(),
        Severity::Warning => "warning".yellow(),
        Severity::Critical => "critical".red().bold(),
    }
}

fn print_diagnostics_stderr(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!("{}: {d}", severity_label(d.severity()));
    }
}

fn diagnostics_json(diagnostics: &[Diagnostic]) -> Result<Vec<Value>, CliError> {
    diagnostics
        .iter()
        .map(|d| serde_json::to_value(to_log_entry(d)).map_err(CliError::from))
        .collect()
}

// ──────────────────── render / check ────────────────────

fn run_render(cli: &Cli, args: &RenderArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let raw = read_input(&args.input)?;
    let diagnostics = Diagnostics::start(cli, &config)?;
    let built = build_from_payload(&raw, &diagnostics.validator(&config));
    let recorded = diagnostics.finish();
    let mode = output_mode(cli);

    let tiles = match built {
        Ok(tiles) => tiles,
        Err(e) => {
            emit_status(mode, &PlatformMessage::decode_failure(&e))?;
            return Err(CliError::User(format!("could not read data: {e}")));
        }
    };

    if tiles.is_empty() {
        if mode == OutputMode::Human {
            print_diagnostics_stderr(&recorded);
        }
        return emit_status(mode, &PlatformMessage::no_data());
    }

    if args.page == 0 || args.page > tiles.len() {
        return Err(CliError::User(format!(
            "page {} out of range (1..={})",
            args.page,
            tiles.len()
        )));
    }

    let cursor = args.page - 1;
    let message = render(&tiles[cursor]);
    let controls = ControlSet::for_page(cursor, tiles.len(), false);

    match mode {
        OutputMode::Human => {
            print_message_human(&message);
            println!("{controls}");
            print_diagnostics_stderr(&recorded);
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "render",
                "page": args.page,
                "total": tiles.len(),
                "message": message,
                "controls": controls,
                "diagnostics": diagnostics_json(&recorded)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_check(cli: &Cli, args: &CheckArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let raw = read_input(&args.input)?;
    let diagnostics = Diagnostics::start(cli, &config)?;
    let built = build_from_payload(&raw, &diagnostics.validator(&config));
    let recorded = diagnostics.finish();

    let tiles = built.map_err(|e| CliError::User(format!("could not read data: {e}")))?;

    match output_mode(cli) {
        OutputMode::Human => {
            for d in &recorded {
                println!("{}: {d}", severity_label(d.severity()));
            }
            let summary = format!("{} tile(s), {} diagnostic(s)", tiles.len(), recorded.len());
            if recorded.is_empty() {
                println!("{}", summary.green());
            } else {
                println!("{}", summary.yellow());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "check",
                "tiles": tiles.len(),
                "diagnostics": diagnostics_json(&recorded)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn emit_status(mode: OutputMode, message: &PlatformMessage) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => {
            print_message_human(message);
            Ok(())
        }
        OutputMode::Json => write_json_line(&json!({ "command": "render", "message": message })),
    }
}

fn print_message_human(message: &PlatformMessage) {
    let text = message.to_text();
    let mut lines = text.lines();
    if message.title.is_some()
        && message.author.is_none()
        && let Some(title) = lines.next()
    {
        println!("{}", title.bold());
    }
    for line in lines {
        println!("{line}");
    }
}

// ──────────────────── browse ────────────────────

/// Writes presented views to stdout and notices to stderr.
struct TerminalDisplay {
    mode: OutputMode,
}

impl DisplaySink for TerminalDisplay {
    fn present(&self, update: &RenderedUpdate) -> Result<(), DisplayError> {
        let mut out = io::stdout().lock();
        let result = match self.mode {
            OutputMode::Json => serde_json::to_writer(&mut out, update)
                .map_err(io::Error::from)
                .and_then(|()| writeln!(out)),
            OutputMode::Human => {
                let rule = "─".repeat(40);
                writeln!(out, "{}", rule.dimmed())
                    .and_then(|()| write!(out, "{}", update.message.to_text()))
                    .and_then(|()| {
                        if update.controls.is_empty() {
                            Ok(())
                        } else {
                            writeln!(out, "{}", update.controls)
                        }
                    })
            }
        };
        result
            .and_then(|()| out.flush())
            .map_err(|e| DisplayError::Rejected {
                details: e.to_string(),
            })
    }

    fn notify(&self, actor: &ActorId, notice: &Notice) -> Result<(), DisplayError> {
        eprintln!("[{actor}] {notice}");
        Ok(())
    }
}

fn parse_browse_command(line: &str) -> Option<Option<TransitionKind>> {
    match line {
        "f" | "first" => Some(Some(TransitionKind::First)),
        "p" | "prev" | "previous" => Some(Some(TransitionKind::Previous)),
        "n" | "next" => Some(Some(TransitionKind::Next)),
        "l" | "last" => Some(Some(TransitionKind::Last)),
        "r" | "refresh" => Some(Some(TransitionKind::Refresh)),
        "q" | "quit" => Some(None),
        _ => None,
    }
}

fn run_browse(cli: &Cli, args: &BrowseArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let raw = read_input(&args.input)?;
    let diagnostics = Diagnostics::start(cli, &config)?;
    let mode = output_mode(cli);

    let mut ctx = SessionContext::from_config(
        &config,
        Arc::new(TerminalDisplay { mode }),
        Arc::clone(&diagnostics.sink),
    );
    if let Some(secs) = args.timeout_secs {
        ctx = ctx.with_idle_timeout(Duration::from_secs(secs.max(1)));
    }
    let source: Arc<dyn RefreshSource> = if args.no_refresh {
        Arc::new(NoRefresh)
    } else {
        Arc::new(FileSource::new(&args.input))
    };

    let owner = ActorId::new(args.owner.clone());
    let default_actor = args
        .actor
        .as_deref()
        .map_or_else(|| owner.clone(), ActorId::from);

    let outcome = NavigationSession::open(Some(raw), source, owner, ctx)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let session = match outcome {
        OpenOutcome::Opened(session) => session,
        OpenOutcome::Empty => {
            print_diagnostics_stderr(&diagnostics.finish());
            return Ok(());
        }
        OpenOutcome::DecodeFailed(e) => {
            diagnostics.finish();
            return Err(CliError::User(format!("could not read data: {e}")));
        }
    };

    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else { continue };
        let actor = words.next().map_or_else(|| default_actor.clone(), ActorId::from);

        match parse_browse_command(word) {
            Some(Some(kind)) => {
                // Rejections are already shown to the actor as notices.
                let _ = session.transition(kind, &actor);
            }
            Some(None) => break,
            None => eprintln!("unknown command {word:?} (f, p, n, l, r, q)"),
        }
    }

    drop(session);
    let recorded = diagnostics.finish();
    if mode == OutputMode::Human {
        print_diagnostics_stderr(&recorded);
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = config
                        .to_toml()
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config
                    .stable_hash()
                    .map_err(|e| CliError::Runtime(e.to_string()))?;
                let source = config
                    .source_path
                    .as_ref()
                    .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string());

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {source}");
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": source,
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("STILES_OUTPUT_FORMAT").ok();
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
            "stiles",
            "--config",
            "/tmp/stiles.toml",
            "--json",
            "--no-color",
            "check",
            "rows.json",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["stiles", "check", "rows.json", "--json", "--log", "/tmp/a.jsonl"]);
        assert!(after.is_ok());
    }

    #[test]
    fn parses_every_subcommand() {
        let cases = [
            vec!["stiles", "render", "-", "--page", "3"],
            vec!["stiles", "check", "rows.json"],
            vec!["stiles", "browse", "rows.json", "--owner", "42", "--as", "7"],
            vec!["stiles", "browse", "rows.json", "--timeout-secs", "5", "--no-refresh"],
            vec!["stiles", "config"],
            vec!["stiles", "config", "show"],
            vec!["stiles", "config", "validate"],
            vec!["stiles", "completions", "zsh"],
        ];

        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn render_requires_input() {
        assert!(Cli::try_parse_from(["stiles", "render"]).is_err());
    }

    #[test]
    fn browse_commands() {
        assert_eq!(parse_browse_command("n"), Some(Some(TransitionKind::Next)));
        assert_eq!(parse_browse_command("refresh"), Some(Some(TransitionKind::Refresh)));
        assert_eq!(parse_browse_command("q"), Some(None));
        assert_eq!(parse_browse_command("x"), None);
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(CliError::User(String::new()).exit_code(), 1);
        assert_eq!(CliError::Runtime(String::new()).exit_code(), 2);
    }
}
