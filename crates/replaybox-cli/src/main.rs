//! replaybox CLI: record and replay interpreter sessions as regression tests.
//!
//! Lists, verifies, and records the cases found under the configured cases
//! root, either one command at a time or from an interactive menu.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes
#![allow(clippy::fn_params_excessive_bools)] // CLI flags are naturally bools

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use replaybox::artifacts::write_json_report;
use replaybox::channel::CommandSource;
use replaybox::config::{load_config_file, DEFAULT_CONFIG_FILE};
use replaybox::interpreter::CancelFlag;
use replaybox::model::{
    BatchReport, CaseOutcome, CaseReport, ExecutionKind, FailureReason, InconclusiveReason,
};
use replaybox::runner::{ErrorCode, Runner, RunnerError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod progress;

/// Exit status after a second Ctrl-C.
const INTERRUPTED_EXIT: i32 = 130;

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "replaybox",
    version,
    about = "Record and replay interpreter sessions as regression tests"
)]
struct Cli {
    /// Harness configuration file (JSON, or YAML by extension)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Show per-case progress and info logs on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List discovered test cases
    List {
        #[arg(long)]
        json: bool,
    },
    /// Verify one case, or every case when NAME is omitted
    Run {
        name: Option<String>,
        #[arg(long)]
        json: bool,
        #[arg(long, help = "Also write the JSON report to this file")]
        report: Option<PathBuf>,
        #[arg(long, help = "Compare without erasing serials and build identifiers")]
        strict: bool,
        #[arg(long, short = 'j', help = "Cases to run in parallel")]
        jobs: Option<usize>,
    },
    /// Play a case live from stdin and save the session as its new baseline
    Record { name: String },
    /// Interactive menu: list, run, record
    Menu,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
}

/// Logs go to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// First Ctrl-C abandons the running case(s); a second one exits.
/// The menu lowers the flag again after each command.
fn install_interrupt_handler() -> CancelFlag {
    let abort = CancelFlag::new();
    let flag = abort.clone();
    let installed = ctrlc::set_handler(move || {
        if flag.is_cancelled() {
            std::process::exit(INTERRUPTED_EXIT);
        }
        flag.cancel();
    });
    if let Err(err) = installed {
        tracing::warn!(error = %err, "Ctrl-C handler not installed");
    }
    abort
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_colors(cli.color);
    init_tracing(cli.verbose);
    if let Commands::Completions { shell } = cli.command {
        return cmd_completions(shell);
    }
    let abort = install_interrupt_handler();
    match cli.command {
        Commands::List { json } => cmd_list(&cli.config, json),
        Commands::Run {
            name,
            json,
            report,
            strict,
            jobs,
        } => cmd_run(
            &cli.config,
            name.as_deref(),
            json,
            report,
            strict,
            jobs,
            cli.verbose,
            &abort,
        ),
        Commands::Record { name } => cmd_record(&cli.config, &name, &abort),
        Commands::Menu => cmd_menu(&cli.config, cli.verbose, &abort),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Handle the list command.
fn cmd_list(config: &Path, json: bool) -> Result<()> {
    let runner = match load_runner(config, false, None, false, None) {
        Ok(runner) => runner,
        Err(err) => return emit_error(json, &err),
    };
    let names = runner.names();
    if json {
        let payload = serde_json::to_string(&names).into_diagnostic()?;
        println!("{payload}");
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(())
}

/// Handle the run command.
#[allow(clippy::too_many_arguments)]
fn cmd_run(
    config: &Path,
    name: Option<&str>,
    json: bool,
    report_path: Option<PathBuf>,
    strict: bool,
    jobs: Option<usize>,
    verbose: bool,
    abort: &CancelFlag,
) -> Result<()> {
    let runner = match load_runner(config, strict, jobs, verbose, Some(abort)) {
        Ok(runner) => runner,
        Err(err) => return emit_error(json, &err),
    };

    let code = if let Some(name) = name {
        let report = match runner.run_case(name) {
            Ok(report) => report,
            Err(err) => return emit_error(json, &err),
        };
        if let Some(path) = &report_path {
            if let Err(err) = write_json_report(path, &report) {
                return emit_error(json, &err);
            }
        }
        if json {
            let payload = serde_json::to_string(&report).into_diagnostic()?;
            println!("{payload}");
        } else {
            print_case(&report);
        }
        exit_code_for_case(&report)
    } else {
        let batch = runner.run_all();
        if let Some(path) = &report_path {
            if let Err(err) = write_json_report(path, &batch) {
                return emit_error(json, &err);
            }
        }
        if json {
            let payload = serde_json::to_string(&batch).into_diagnostic()?;
            println!("{payload}");
        } else {
            print_batch(&batch);
        }
        exit_code_for_batch(&batch)
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Handle the record command.
fn cmd_record(config: &Path, name: &str, abort: &CancelFlag) -> Result<()> {
    let runner = match load_runner(config, false, None, false, Some(abort)) {
        Ok(runner) => runner,
        Err(err) => return emit_error(false, &err),
    };
    match record_session(&runner, name) {
        Ok(()) => Ok(()),
        Err(err) => emit_error(false, &err),
    }
}

/// Handle the menu command.
fn cmd_menu(config: &Path, verbose: bool, abort: &CancelFlag) -> Result<()> {
    let runner = match load_runner(config, false, None, verbose, Some(abort)) {
        Ok(runner) => runner,
        Err(err) => return emit_error(false, &err),
    };
    println!("replaybox: {} test case(s)", runner.registry().len());
    print_menu_help();

    loop {
        print!("replaybox> ");
        io::stdout().flush().into_diagnostic()?;
        let Some(line) = read_console_line().into_diagnostic()? else {
            break;
        };
        // A Ctrl-C at the prompt only arms the second-press exit.
        abort.reset();
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (None, _) => {}
            (Some("quit" | "q" | "exit"), _) => break,
            (Some("list" | "l"), _) => {
                for name in runner.names() {
                    println!("  {name}");
                }
            }
            (Some("run" | "r"), None) => print_batch(&runner.run_all()),
            (Some("run" | "r"), Some(name)) => match runner.run_case(name) {
                Ok(report) => print_case(&report),
                Err(err) => eprintln!("error: {err}"),
            },
            (Some("record"), Some(name)) => {
                if let Err(err) = record_session(&runner, name) {
                    eprintln!("error: {err}");
                }
            }
            (Some("help" | "?"), _) => print_menu_help(),
            (Some(other), _) => println!("unknown command '{other}'; type 'help'"),
        }
        if abort.is_cancelled() {
            eprintln!("interrupted");
            abort.reset();
        }
    }
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn load_runner(
    config_path: &Path,
    strict: bool,
    jobs: Option<usize>,
    verbose: bool,
    abort: Option<&CancelFlag>,
) -> Result<Runner, RunnerError> {
    let mut config = load_config_file(config_path)?;
    if strict {
        config.normalization.strict = true;
    }
    if let Some(jobs) = jobs {
        config.jobs = jobs;
    }
    let mut runner = Runner::from_config(&config)?;
    let options = runner.options_mut();
    options.abort = abort.cloned();
    if verbose {
        options.progress = Some(Arc::new(progress::VerboseProgress::new()));
    }
    Ok(runner)
}

/// Player commands typed on the console.
///
/// Reads through the process-wide stdin buffer so the menu and a recording
/// session never steal each other's lines.
struct ConsoleSource;

impl CommandSource for ConsoleSource {
    fn next_command(&mut self) -> io::Result<Option<String>> {
        read_console_line()
    }
}

fn read_console_line() -> io::Result<Option<String>> {
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let kept = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(kept);
    Ok(Some(line))
}

fn record_session(runner: &Runner, name: &str) -> Result<(), RunnerError> {
    // Fail before the session starts rather than after the player is done.
    runner.case(name)?;
    eprintln!("recording '{name}': play until the program ends, or close stdin (Ctrl-D)");
    let report = runner.record_case(name, ConsoleSource, Some(Box::new(io::stdout())))?;
    println!();
    if report.execution == ExecutionKind::Faulted {
        eprintln!("warning: the session ended with an interpreter fault; it is part of the baseline");
    }
    eprintln!(
        "recorded {} command(s) to {}",
        report.commands,
        report.input_path.display()
    );
    eprintln!("new baseline: {}", report.baseline_path.display());
    Ok(())
}

fn case_line(report: &CaseReport) -> String {
    let status = match &report.outcome {
        CaseOutcome::Passed => "pass".to_string(),
        CaseOutcome::Failed { reason } => match reason {
            FailureReason::Mismatch { line } => format!("FAIL (differs at line {line})"),
            FailureReason::CompilationFailed => "FAIL (compilation failed)".to_string(),
            FailureReason::Setup => "FAIL (could not start)".to_string(),
        },
        CaseOutcome::Inconclusive { reason } => match reason {
            InconclusiveReason::MissingInput => "inconclusive (no recorded input)".to_string(),
            InconclusiveReason::MissingBaseline => {
                "inconclusive (no expected output)".to_string()
            }
        },
    };
    format!("{}: {status}", report.name)
}

fn print_case(report: &CaseReport) {
    println!("{}", case_line(report));
    if !report.outcome.is_passed() {
        if let Some(detail) = &report.detail {
            for line in detail.lines() {
                println!("    {line}");
            }
        }
    }
    if let Some(path) = &report.failure_artifact {
        println!("    actual output: {}", path.display());
    }
}

fn print_batch(batch: &BatchReport) {
    for report in &batch.cases {
        println!("{}", case_line(report));
    }
    let counts = &batch.counts;
    println!();
    println!(
        "{} passed, {} failed, {} inconclusive ({}ms)",
        counts.passed, counts.failed, counts.inconclusive, batch.duration_ms
    );
    let artifacts: Vec<_> = batch
        .cases
        .iter()
        .filter_map(|report| report.failure_artifact.as_ref())
        .collect();
    if counts.failed > 0 || !artifacts.is_empty() {
        println!("{} failure(s); actual output written to:", counts.failed);
        for path in artifacts {
            println!("  {}", path.display());
        }
    }
}

fn print_menu_help() {
    println!("commands:");
    println!("  list          list test cases");
    println!("  run           run every test case");
    println!("  run NAME      run one test case");
    println!("  record NAME   play NAME live and save a new baseline");
    println!("  quit          leave the menu");
}

fn emit_error(json: bool, err: &RunnerError) -> Result<()> {
    if json {
        let payload = serde_json::to_string(&err.to_error_info()).into_diagnostic()?;
        println!("{payload}");
    } else {
        eprintln!("error: {err}");
    }
    std::process::exit(err.exit_code());
}

/// Inconclusive cases pass a batch but not a single run.
fn exit_code_for_case(report: &CaseReport) -> i32 {
    match &report.outcome {
        CaseOutcome::Passed => 0,
        CaseOutcome::Failed { reason } => match reason {
            FailureReason::Mismatch { .. } => ErrorCode::ComparisonMismatch.exit_code(),
            FailureReason::CompilationFailed => ErrorCode::CompilationFailed.exit_code(),
            FailureReason::Setup => ErrorCode::Io.exit_code(),
        },
        CaseOutcome::Inconclusive { .. } => ErrorCode::MissingFixture.exit_code(),
    }
}

fn exit_code_for_batch(batch: &BatchReport) -> i32 {
    if batch.counts.failed > 0 {
        ErrorCode::ComparisonMismatch.exit_code()
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaybox::model::RunId;

    fn report(name: &str, outcome: CaseOutcome) -> CaseReport {
        CaseReport {
            name: name.to_string(),
            outcome,
            execution: ExecutionKind::Completed,
            failure_artifact: None,
            detail: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn single_case_exit_codes() {
        assert_eq!(exit_code_for_case(&report("a", CaseOutcome::Passed)), 0);
        let mismatch = CaseOutcome::Failed {
            reason: FailureReason::Mismatch { line: 3 },
        };
        assert_eq!(exit_code_for_case(&report("a", mismatch)), 1);
        let build = CaseOutcome::Failed {
            reason: FailureReason::CompilationFailed,
        };
        assert_eq!(exit_code_for_case(&report("a", build)), 12);
        let missing = CaseOutcome::Inconclusive {
            reason: InconclusiveReason::MissingInput,
        };
        assert_eq!(exit_code_for_case(&report("a", missing)), 11);
    }

    #[test]
    fn batch_with_only_inconclusive_cases_succeeds() {
        let batch = BatchReport::new(
            RunId::new(),
            vec![
                report("a", CaseOutcome::Passed),
                report(
                    "b",
                    CaseOutcome::Inconclusive {
                        reason: InconclusiveReason::MissingBaseline,
                    },
                ),
            ],
            5,
        );
        assert_eq!(exit_code_for_batch(&batch), 0);
    }

    #[test]
    fn batch_with_a_failure_exits_one() {
        let batch = BatchReport::new(
            RunId::new(),
            vec![report(
                "a",
                CaseOutcome::Failed {
                    reason: FailureReason::Setup,
                },
            )],
            5,
        );
        assert_eq!(exit_code_for_batch(&batch), 1);
    }

    #[test]
    fn case_line_names_the_first_differing_line() {
        let line = case_line(&report(
            "greet",
            CaseOutcome::Failed {
                reason: FailureReason::Mismatch { line: 6 },
            },
        ));
        assert_eq!(line, "greet: FAIL (differs at line 6)");
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from(["replaybox", "run", "greet", "--strict", "-j", "4"]);
        assert!(matches!(
            cli.as_ref().map(|cli| &cli.command),
            Ok(Commands::Run {
                name: Some(name),
                strict: true,
                jobs: Some(4),
                ..
            }) if name == "greet"
        ));
        assert!(cli.is_ok_and(|cli| cli.config == Path::new(DEFAULT_CONFIG_FILE)));
    }
}
