//! moco: run commands in timestamped run directories and track their results.
//!
//! Each run records the git state it started from and how it ended; `list`,
//! `show`, `status` and `archive` work from those records.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use moco::archive::{ArchiveRequest, archive_runs};
use moco::core::age::cutoff_from;
use moco::core::query::{RunFilter, SortKey, command_pattern};
use moco::core::retention::ArchiveStatus;
use moco::core::types::{RunRecord, RunStatus};
use moco::exit_codes;
use moco::io::bundle::ArchiveFormat;
use moco::io::config::{Config, load_config};
use moco::io::process::StopSignals;
use moco::list::{ListRequest, list_runs};
use moco::logging;
use moco::render::{ListFormat, StatusFormat, StatusLevel, render_runs, render_status};
use moco::run::{RunRequest, run_experiment};
use moco::show::{load_record, page, resolve_record};
use moco::status::project_status;

#[derive(Parser)]
#[command(
    name = "moco",
    version,
    about = "Run commands in timestamped run directories and track their results"
)]
struct Cli {
    /// Directory holding run directories (overrides `paths.base_dir`).
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command inside a new run directory and record the outcome.
    #[command(visible_alias = "r")]
    Run(RunArgs),
    /// List recorded runs.
    #[command(visible_alias = "ls")]
    List(ListArgs),
    /// Print the record of one run.
    Show(ShowArgs),
    /// Summarize the repository and recorded runs.
    #[command(visible_alias = "st")]
    Status(StatusArgs),
    /// Compress finished runs into an archive directory.
    Archive(ArchiveArgs),
    /// Print the effective configuration as TOML.
    #[command(visible_alias = "co")]
    Config {
        /// Print built-in defaults instead of the resolved configuration.
        #[arg(long)]
        default: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Run even if the working tree has uncommitted changes.
    #[arg(short, long)]
    force: bool,
    /// Run the command in the current directory instead of the run directory.
    #[arg(short, long)]
    no_pushd: bool,
    /// Delete the run directory if the command fails.
    #[arg(short, long)]
    cleanup_on_fail: bool,
    /// Command and arguments to execute.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(short, long, value_enum)]
    format: Option<ListFormat>,
    #[arg(short, long, value_enum)]
    sort: Option<SortKey>,
    /// Reverse the sort order (`--reverse=false` undoes `list.reverse` from config).
    #[arg(
        short,
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    reverse: Option<bool>,
    /// Only runs whose branch contains this text.
    #[arg(short, long)]
    branch: Option<String>,
    /// Only runs with this status (success, failure, running).
    #[arg(long)]
    status: Option<RunStatus>,
    /// Only runs started within this age (e.g. 7d, 12h, 30m).
    #[arg(long, value_name = "AGE")]
    since: Option<String>,
    /// Only runs whose command matches this regex.
    #[arg(short, long, value_name = "REGEX")]
    command: Option<String>,
    /// Show at most this many runs (0 = all).
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct ShowArgs {
    /// Run directory, run directory name, or record file.
    run: PathBuf,
    /// Print directly instead of through `$PAGER`.
    #[arg(long)]
    no_pager: bool,
}

#[derive(Args)]
struct StatusArgs {
    #[arg(short, long, value_enum)]
    level: Option<StatusLevel>,
    #[arg(short, long, value_enum)]
    format: Option<StatusFormat>,
}

#[derive(Args)]
struct ArchiveArgs {
    /// Specific run directories to archive (filters are ignored when given).
    runs: Vec<PathBuf>,
    /// Only runs older than this age (e.g. 30d); empty for any age.
    #[arg(short, long, value_name = "AGE")]
    older_than: Option<String>,
    #[arg(short, long, value_enum)]
    status: Option<ArchiveStatus>,
    #[arg(short, long, value_enum)]
    format: Option<ArchiveFormat>,
    /// Destination directory.
    #[arg(short, long, value_name = "DIR")]
    to: Option<PathBuf>,
    /// Delete run directories after archiving them.
    #[arg(long)]
    delete: bool,
    /// Show what would be archived without changing anything.
    #[arg(long)]
    dry_run: bool,
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let mut cfg = load_config(&cwd)?;
    if let Some(base_dir) = cli.base_dir {
        cfg.paths.base_dir = base_dir;
    }
    let cfg = cfg;

    match cli.command {
        Command::Run(args) => cmd_run(&cfg, cwd, args).await,
        Command::List(args) => cmd_list(&cfg, args),
        Command::Show(args) => cmd_show(&cfg, &args),
        Command::Status(args) => cmd_status(&cfg, cwd, &args),
        Command::Archive(args) => cmd_archive(&cfg, args),
        Command::Config { default } => cmd_config(&cfg, default),
    }
}

async fn cmd_run(cfg: &Config, cwd: PathBuf, args: RunArgs) -> Result<i32> {
    let mut request = RunRequest::new(cfg, args.command, cwd);
    request.force |= args.force;
    request.no_pushd |= args.no_pushd;
    request.cleanup_on_fail |= args.cleanup_on_fail;

    let signals = StopSignals::register()?;
    let outcome = run_experiment(cfg, &request, signals.recv()).await?;
    info!(run_dir = %outcome.run_dir.display(), exit_code = outcome.exit_code, "run recorded");
    outcome.into_result()?;
    Ok(exit_codes::OK)
}

fn cmd_list(cfg: &Config, args: ListArgs) -> Result<i32> {
    let now = Utc::now();
    let filter = RunFilter {
        branch: args.branch,
        status: args.status,
        since: cutoff_from(now, args.since.as_deref())?,
        command: args.command.as_deref().map(command_pattern).transpose()?,
    };
    let request = ListRequest {
        base_dir: cfg.paths.base_dir.clone(),
        record_file: cfg.paths.summary_file.clone(),
        filter,
        sort: args.sort.unwrap_or(cfg.list.sort_by),
        reverse: args.reverse.unwrap_or(cfg.list.reverse),
        limit: args.limit.unwrap_or(cfg.list.limit),
    };
    let runs = list_runs(&request, now)?;
    let format = args.format.unwrap_or(cfg.list.format);
    if runs.is_empty() && format != ListFormat::Json {
        info!("No runs found");
        return Ok(exit_codes::OK);
    }
    print!("{}", render_runs(format, &runs, now)?);
    Ok(exit_codes::OK)
}

fn cmd_show(cfg: &Config, args: &ShowArgs) -> Result<i32> {
    let path = resolve_record(&args.run, &cfg.paths.base_dir, &cfg.paths.summary_file)?;
    let (_, text) = load_record(&path)?;
    page(&text, !args.no_pager)?;
    Ok(exit_codes::OK)
}

fn cmd_status(cfg: &Config, cwd: PathBuf, args: &StatusArgs) -> Result<i32> {
    let report = project_status(&cwd, &cfg.paths.base_dir, &cfg.paths.summary_file, Utc::now())?;
    let level = args.level.unwrap_or(cfg.status.level);
    let format = args.format.unwrap_or(cfg.status.format);
    print!("{}", render_status(format, level, &report)?);
    Ok(exit_codes::OK)
}

fn cmd_archive(cfg: &Config, args: ArchiveArgs) -> Result<i32> {
    let mut request = ArchiveRequest::new(cfg);
    request.runs = args.runs;
    if let Some(older_than) = args.older_than {
        request.older_than = Some(older_than);
    }
    if let Some(status) = args.status {
        request.status = status;
    }
    if let Some(format) = args.format {
        request.format = format;
    }
    if let Some(to) = args.to {
        request.dest = to;
    }
    request.delete |= args.delete;
    request.dry_run = args.dry_run;

    let yes = args.yes;
    let delete = request.delete;
    let report = archive_runs(&request, Utc::now(), |runs| {
        print_selection(runs);
        if yes {
            return Ok(true);
        }
        let prompt = if delete {
            format!("Archive and delete {} run(s)?", runs.len())
        } else {
            format!("Archive {} run(s)?", runs.len())
        };
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("read confirmation (pass --yes when not running in a terminal)")
    })?;

    if report.selected.is_empty() {
        println!("No runs to archive.");
        return Ok(exit_codes::OK);
    }
    if request.dry_run {
        print_selection(&report.selected);
        println!("Dry run - no changes made.");
        return Ok(exit_codes::OK);
    }
    if report.cancelled {
        println!("Archive cancelled.");
        return Ok(exit_codes::OK);
    }

    println!(
        "Archived {} run(s) to {}",
        report.archives.len(),
        request.dest.display()
    );
    if !report.deleted.is_empty() {
        println!("Deleted {} run directories", report.deleted.len());
    }
    if !report.errors.is_empty() {
        bail!(
            "{} archive step(s) failed:\n- {}",
            report.errors.len(),
            report.errors.join("\n- ")
        );
    }
    Ok(exit_codes::OK)
}

fn print_selection(runs: &[RunRecord]) {
    println!("Runs to archive ({}):", runs.len());
    for run in runs {
        println!("  {}  {}  {}", run.directory.display(), run.status_label(), run.command);
    }
}

fn cmd_config(cfg: &Config, default: bool) -> Result<i32> {
    let text = if default {
        Config::default().to_toml()?
    } else {
        cfg.to_toml()?
    };
    print!("{text}");
    Ok(exit_codes::OK)
}
