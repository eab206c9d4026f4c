use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use tracefix::config::{self, Settings};
use tracefix::pipeline::{self, PatchStatus, ReplayModel, Stage, ToolCall, ToolOutput, Toolbox};
use tracefix::verify::{self, MatchMode};
use tracefix::{source, syntax, telemetry, trace, NamingPolicy, PatchWriter};

#[derive(Parser)]
#[command(name = "tracefix")]
#[command(about = "Map exception traces onto local code and write verified fixes", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./tracefix.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for where reported paths land locally.
#[derive(Args, Clone, Default)]
struct RootArgs {
    /// Local checkout of the traced codebase
    #[arg(short = 'r', long)]
    target_root: Option<String>,

    /// Deployment prefix to drop from reported paths (e.g. /usr/srv/app)
    #[arg(long)]
    strip_prefix: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run diagnosis, planning and patching for a trace file
    Run {
        /// Trace JSON with exception events
        trace: PathBuf,

        /// Recorded stage responses to replay
        #[arg(long)]
        replay: PathBuf,

        #[command(flatten)]
        root: RootArgs,

        /// Directory for reports and history
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Show unified diff of the written fix
        #[arg(short, long)]
        diff: bool,
    },

    /// Show the error records in a trace file
    Trace {
        trace: PathBuf,

        /// Print records as JSON instead of the prompt context
        #[arg(long)]
        json: bool,
    },

    /// Map reported paths to local paths
    Resolve {
        #[arg(required = true)]
        paths: Vec<String>,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Print a source file, or a 1-based line range of it
    Read {
        path: String,

        /// Inclusive range, e.g. 5:12
        #[arg(short, long, value_parser = parse_range)]
        lines: Option<(usize, usize)>,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Check that a snippet is present in a file (exit 1 when absent)
    Verify {
        path: String,

        snippet: String,

        /// Compare lines with surrounding whitespace ignored
        #[arg(long)]
        trimmed: bool,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Write new content next to a file as <prefix><name>
    Write {
        path: String,

        /// File holding the full new content
        #[arg(long)]
        content: PathBuf,

        /// Output name prefix (default: fixed_)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Show unified diff against the original
        #[arg(short, long)]
        diff: bool,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Syntax-check a local file
    Validate { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref())?;

    let level = match cli.verbose {
        0 => settings.log_level(),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    telemetry::init_tracing(cli.json_logs || settings.logging.json, level);

    match cli.command {
        Commands::Run {
            trace,
            replay,
            root,
            output_dir,
            diff,
        } => {
            let mut settings = with_root(settings, &root);
            if let Some(dir) = output_dir {
                settings.paths.output_dir = dir;
            }
            cmd_run(&settings, &trace, &replay, diff)
        }

        Commands::Trace { trace, json } => cmd_trace(&trace, json),

        Commands::Resolve { paths, root } => cmd_resolve(&with_root(settings, &root), &paths),

        Commands::Read { path, lines, root } => {
            cmd_read(&with_root(settings, &root), &path, lines)
        }

        Commands::Verify {
            path,
            snippet,
            trimmed,
            root,
        } => cmd_verify(&with_root(settings, &root), &path, &snippet, trimmed),

        Commands::Write {
            path,
            content,
            prefix,
            diff,
            root,
        } => {
            let mut settings = with_root(settings, &root);
            if let Some(prefix) = prefix {
                settings.patch.prefix = prefix;
            }
            cmd_write(&settings, &path, &content, diff)
        }

        Commands::Validate { file } => cmd_validate(&file),
    }
}

/// CLI flags win over config file and environment.
fn with_root(mut settings: Settings, root: &RootArgs) -> Settings {
    if let Some(target_root) = &root.target_root {
        settings.paths.target_root = Some(target_root.clone());
    }
    if let Some(prefix) = &root.strip_prefix {
        settings.paths.strip_prefix = Some(prefix.clone());
    }
    settings
}

fn toolbox(settings: &Settings) -> Result<Toolbox> {
    let resolver = settings.resolver().context("invalid target root")?;
    let naming = NamingPolicy::prefixed(settings.patch.prefix.as_str())?;
    Ok(Toolbox::new(resolver, PatchWriter::new(naming)))
}

fn parse_range(value: &str) -> Result<(usize, usize), String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got {value:?}"))?;
    let start = start.trim().parse().map_err(|e| format!("bad start: {e}"))?;
    let end = end.trim().parse().map_err(|e| format!("bad end: {e}"))?;
    Ok((start, end))
}

/// Helper: Show unified diff between original and patched content
fn display_diff(original_path: &Path, fixed_path: &Path, original: &str, fixed: &str) {
    println!("\n{}", format!("--- {}", original_path.display()).dimmed());
    println!("{}", format!("+++ {}", fixed_path.display()).dimmed());

    let diff = TextDiff::from_lines(original, fixed);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_run(settings: &Settings, trace_file: &Path, replay: &Path, show_diff: bool) -> Result<()> {
    let model = ReplayModel::from_file(replay)?;

    println!("Trace: {}", trace_file.display());
    match settings.paths.target_root.as_deref() {
        Some(root) if !root.trim().is_empty() => println!("Target root: {root}"),
        _ => println!("Target root: {}", "not set (paths used as-is)".dimmed()),
    }
    println!("Output: {}", settings.output_dir().display());
    println!();

    let report = pipeline::run(&model, settings, trace_file)?;
    let state = &report.state;

    for failure in state.failures() {
        eprintln!("{} {}: {}", "✗".red(), failure.stage, failure.message);
    }

    if let Some(rca) = state.rca_report() {
        println!("{} Diagnosis", "✓".green());
        println!("  Error: {}: {}", rca.error_type, rca.error_message);
        println!("  Severity: {:?}", rca.severity);
        println!("  Affected file: {}", rca.affected_file);
        println!("  Root cause: {}", rca.root_cause_summary);
    }

    if let Some(plan) = state.fix_plan() {
        println!("{} Fix plan", "✓".green());
        println!("  Summary: {}", plan.fix_summary);
        println!("  Changes: {}", plan.changes.len());
    }

    if let Some(patch) = state.patch_report() {
        let mark = match patch.status {
            PatchStatus::Applied if patch.is_clean() => "✓".green(),
            PatchStatus::Applied => "⊙".yellow(),
            PatchStatus::Rejected => "⊘".cyan(),
            PatchStatus::Failed => "✗".red(),
        };
        println!("{} Patch: {:?}", mark, patch.status);
        println!("  Original: {}", patch.original_file);
        if let Some(fixed) = &patch.fixed_file {
            println!("  Fixed: {}", fixed.display());
        }
        if !patch.applied_changes_summary.is_empty() {
            println!("  Summary: {}", patch.applied_changes_summary);
        }
        if let Some(error) = &patch.error {
            println!("  Error: {}", error.red());
        }
        for suggestion in &patch.suggestions {
            println!("  Did you mean: {}", suggestion.dimmed());
        }
        for diagnostic in &patch.diagnostics {
            println!("  Syntax: {}", diagnostic.to_string().yellow());
        }
        for warning in &patch.warnings {
            println!("  Warning: {}", warning.yellow());
        }

        if show_diff {
            if let (Some(local), Some(fixed)) = (&patch.local_file, &patch.fixed_file) {
                let original = fs::read_to_string(local)?;
                let patched = fs::read_to_string(fixed)?;
                display_diff(local, fixed, &original, &patched);
            }
        }
    }

    for stage in Stage::ALL {
        if !state.completed(stage) && !state.failures().iter().any(|f| f.stage == stage) {
            println!("{} {}: skipped", "⊘".cyan(), stage);
        }
    }

    println!();
    println!("{}", "Artifacts:".bold());
    for artifact in &report.artifacts {
        println!("  {}", artifact.display());
    }
    for error in &report.artifact_errors {
        eprintln!("  {} {}", "✗".red(), error);
    }

    if !report.succeeded() {
        eprintln!("\n{}", "Pipeline did not produce a clean fix".yellow());
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_trace(trace_file: &Path, json: bool) -> Result<()> {
    let records = trace::load(trace_file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    for (idx, record) in records.iter().enumerate() {
        if idx > 0 {
            println!("\n{}", "-".repeat(80).dimmed());
        }
        println!("{}", record.prompt_context());
    }
    Ok(())
}

fn cmd_resolve(settings: &Settings, paths: &[String]) -> Result<()> {
    let resolver = settings.resolver().context("invalid target root")?;
    let mut missing = 0;

    for reported in paths {
        match resolver.resolve(reported) {
            Ok(resolved) if resolved.is_resolved() => {
                println!("{} {} -> {}", "✓".green(), reported, resolved.local().display());
            }
            Ok(resolved) => {
                println!(
                    "{} {} -> {} (not found)",
                    "✗".red(),
                    reported,
                    resolved.local().display()
                );
                missing += 1;
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), reported, e);
                missing += 1;
            }
        }
    }

    if missing > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_read(settings: &Settings, path: &str, lines: Option<(usize, usize)>) -> Result<()> {
    let output = toolbox(settings)?.invoke(&ToolCall::ReadSource {
        path: path.to_string(),
        lines,
    })?;

    if let ToolOutput::ReadSource { content, .. } = output {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn cmd_verify(settings: &Settings, path: &str, snippet: &str, trimmed: bool) -> Result<()> {
    let resolver = settings.resolver().context("invalid target root")?;
    let resolved = resolver.resolve(path)?;
    let file = source::read(&resolved)?;

    let mode = if trimmed {
        MatchMode::LineTrimmed
    } else {
        MatchMode::Exact
    };
    let found = verify::locate(&file.content, snippet, mode, 2);

    if found.found {
        let line = found.line_number.unwrap_or_default();
        println!(
            "{} Found at line {} ({} occurrence(s))",
            "✓".green(),
            line,
            found.occurrences
        );
        if let Some(context) = &found.context {
            println!("{}", context.dimmed());
        }
        return Ok(());
    }

    eprintln!("{} Snippet not found in {}", "✗".red(), resolved.local().display());
    for suggestion in &found.suggestions {
        eprintln!("  Did you mean: {}", suggestion);
    }
    std::process::exit(1);
}

fn cmd_write(settings: &Settings, path: &str, content_file: &Path, show_diff: bool) -> Result<()> {
    let content = fs::read_to_string(content_file)
        .with_context(|| format!("failed to read {}", content_file.display()))?;

    let toolbox = toolbox(settings)?;
    let output = toolbox.invoke(&ToolCall::WritePatch {
        path: path.to_string(),
        content: content.clone(),
    })?;
    let ToolOutput::WritePatch { result } = output else {
        anyhow::bail!("unexpected tool output");
    };

    if !result.success {
        eprintln!("{} {}", "✗".red(), result);
        std::process::exit(1);
    }
    println!("{} {}", "✓".green(), result);

    if let Some(fixed) = &result.output {
        if show_diff {
            let original = fs::read_to_string(&result.original)?;
            display_diff(&result.original, fixed, &original, &content);
        }
        match report_validation(fixed) {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(syntax::SyntaxError::UnsupportedLanguage { .. }) => {
                println!("{} syntax not checked: no grammar for {}", "⊘".yellow(), fixed.display());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    if !report_validation(file)? {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the syntax check of `file`; returns whether it is valid.
fn report_validation(file: &Path) -> Result<bool, syntax::SyntaxError> {
    let validation = syntax::validate_file(file)?;
    if validation.valid {
        println!("{} {} syntax valid", "✓".green(), validation.language);
    } else {
        eprintln!(
            "{} {} syntax invalid in {}",
            "✗".red(),
            validation.language,
            file.display()
        );
        for diagnostic in &validation.diagnostics {
            eprintln!("  {}", diagnostic);
        }
    }
    Ok(validation.valid)
}
