use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{Level, warn};
use wikimover_core::config::{WikiConfig, load_config};
use wikimover_core::input::load_rename_list;
use wikimover_core::job::{JobHooks, MoveJob};
use wikimover_core::mediawiki::{MediaWikiClient, MediaWikiClientConfig};
use wikimover_core::options::{FollowUps, MoveMode, MoveOptions, RedirectOption};
use wikimover_core::report::{MoveReport, ReplacementRow};
use wikimover_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_layout, inspect_runtime, resolve_paths,
};
use wikimover_core::store::ContentStore;

#[derive(Debug, Parser)]
#[command(
    name = "wikimover",
    version,
    about = "Bulk page moves with link fixing for MediaWiki sites"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Log debug details to stderr")]
    verbose: bool,
    #[arg(long, global = true, help = "Print reports as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
            json: cli.json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .wikimover/ and a default config.toml")]
    Init(InitArgs),
    #[command(about = "Classify a rename list without changing anything")]
    Plan(PlanArgs),
    #[command(about = "Plan and execute a rename list")]
    Run(RunArgs),
    #[command(about = "Continue an interrupted run")]
    Resume(JobArgs),
    #[command(about = "Show runtime layout and any unfinished run")]
    Status,
    #[command(about = "Forget an unfinished run")]
    Discard,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config.toml")]
    force: bool,
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[arg(value_name = "LIST", help = "JSON array of {from, to} or a two-column CSV/TSV")]
    list: PathBuf,
    #[command(flatten)]
    job: JobArgs,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(value_name = "LIST", help = "JSON array of {from, to} or a two-column CSV/TSV")]
    list: PathBuf,
    #[command(flatten)]
    job: JobArgs,
}

#[derive(Debug, Clone, Args)]
struct JobArgs {
    #[arg(long, help = "Preview edits as diffs; move and save nothing")]
    dry_run: bool,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[arg(long, value_enum)]
    redirects: Option<RedirectsArg>,
    #[arg(long, value_name = "TEXT")]
    summary: Option<String>,
    #[arg(long, help = "Also rename link captions that spell the old title")]
    update_caption: bool,
    #[arg(long, help = "Do not rewrite links on referring pages")]
    no_fix_links: bool,
    #[arg(long, help = "Move unused pages instead of proposing their deletion")]
    no_propose_unused: bool,
    #[arg(long, value_name = "TITLE", help = "Write a wikitable report to this page")]
    report_page: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    None,
    MoveSafely,
    MoveOverExisting,
}

impl From<ModeArg> for MoveMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::None => MoveMode::None,
            ModeArg::MoveSafely => MoveMode::MoveSafely,
            ModeArg::MoveOverExisting => MoveMode::MoveOverExisting,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RedirectsArg {
    Create,
    Suppress,
    CreateButProposeDeletion,
}

impl From<RedirectsArg> for RedirectOption {
    fn from(value: RedirectsArg) -> Self {
        match value {
            RedirectsArg::Create => RedirectOption::Create,
            RedirectsArg::Suppress => RedirectOption::Suppress,
            RedirectsArg::CreateButProposeDeletion => RedirectOption::CreateButProposeDeletion,
        }
    }
}

impl JobArgs {
    fn apply(&self, options: &mut MoveOptions, client: &MediaWikiClient) -> Result<()> {
        options.dry_run = self.dry_run;
        if let Some(mode) = self.mode {
            options.mode = mode.into();
        }
        if let Some(redirects) = self.redirects {
            options.redirects = redirects.into();
        }
        if let Some(summary) = &self.summary {
            if summary.trim().is_empty() {
                bail!("--summary cannot be empty");
            }
            options.summary = summary.trim().to_string();
        }
        if self.update_caption {
            options.follow_ups.insert(FollowUps::UPDATE_CAPTION);
        }
        if self.no_fix_links {
            options.follow_ups.remove(FollowUps::FIX_LINKS);
        }
        if self.no_propose_unused {
            options.follow_ups.remove(FollowUps::PROPOSE_UNUSED);
        }
        if let Some(report_page) = &self.report_page {
            let title = client
                .namespaces()
                .parse_title(report_page)
                .with_context(|| format!("invalid --report-page: {report_page}"))?;
            options.report_page = Some(title);
            options.follow_ups.insert(FollowUps::EMIT_REPORT);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Plan(args)) => run_plan(&runtime, args),
        Some(Commands::Run(args)) => run_job(&runtime, Some(&args.list), &args.job),
        Some(Commands::Resume(args)) => run_job(&runtime, None, &args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Discard) => run_discard(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, args.force)?;

    println!("Initialized wikimover runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_plan(runtime: &RuntimeOptions, args: PlanArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut client = connect(&config)?;
    let (options, hooks) = job_settings(&config, &args.job, &client)?;
    let candidates = load_rename_list(&args.list, client.namespaces())?;

    let snapshot = paths.snapshot_file(&config);
    let mut job = MoveJob::new(&mut client, options, hooks, snapshot);
    let (planned, report) = job.plan_only(candidates)?;
    let rows = planned.iter().map(ReplacementRow::from).collect::<Vec<_>>();

    if runtime.json {
        #[derive(Serialize)]
        struct PlanOutput<'a> {
            planned: usize,
            skipped: usize,
            replacements: &'a [ReplacementRow],
            warnings: &'a [String],
        }
        print_json(&PlanOutput {
            planned: report.planned,
            skipped: report.skipped,
            replacements: &rows,
            warnings: &report.warnings,
        })?;
    } else {
        println!("move plan");
        println!("list: {}", normalize_path(&args.list));
        println!("planned: {}", report.planned);
        println!("skipped: {}", report.skipped);
        print_rows(&rows);
        print_warnings(&report.warnings);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_job(runtime: &RuntimeOptions, list: Option<&Path>, args: &JobArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let snapshot = paths.snapshot_file(&config);
    if list.is_none() && !snapshot.exists() {
        bail!(
            "no unfinished run at {}; start one with `wikimover run <LIST>`",
            normalize_path(snapshot.path())
        );
    }

    let mut client = connect(&config)?;
    let (options, hooks) = job_settings(&config, args, &client)?;
    let candidates = match list {
        Some(list) => Some(load_rename_list(list, client.namespaces())?),
        None => None,
    };

    let mut job = MoveJob::new(&mut client, options, hooks, snapshot);
    let report = match candidates {
        Some(candidates) => job.run(candidates)?,
        None => job.resume()?,
    };
    print_report(runtime, &report)?;
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
        println!("requests: {}", client.request_count());
    }

    if !report.success {
        bail!(
            "move job finished with {} failure(s); run `wikimover resume` to retry",
            report.failures.len()
        );
    }
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let status = inspect_runtime(&paths, &config);

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "api_url: {}",
        config.api_url_owned().unwrap_or_else(|| "<unset>".to_string())
    );
    println!("snapshot_path: {}", normalize_path(&status.snapshot_path));
    println!("unfinished_run: {}", format_flag(status.snapshot_exists));
    if status.snapshot_exists {
        let table = config.namespace_table();
        match paths.snapshot_file(&config).try_load(&table) {
            Ok(Some(saved)) => {
                let rows = saved.iter().map(ReplacementRow::from).collect::<Vec<_>>();
                print_rows(&rows);
            }
            Ok(None) => {}
            Err(error) => println!("snapshot_error: {error:#}"),
        }
    }
    print_warnings(&status.warnings);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_discard(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let snapshot = paths.snapshot_file(&config);
    let deleted = snapshot.delete()?;

    println!("discard");
    println!("snapshot_path: {}", normalize_path(snapshot.path()));
    println!("deleted: {}", format_flag(deleted));
    Ok(())
}

fn connect(config: &WikiConfig) -> Result<MediaWikiClient> {
    let mut client = MediaWikiClient::new(
        MediaWikiClientConfig::from_config(config),
        config.namespace_table(),
    )?;
    if let Err(error) = client.load_site_namespaces() {
        warn!(error = %format!("{error:#}"), "could not load site namespaces; using configured ones");
    }
    client.login_from_env()?;
    Ok(client)
}

fn job_settings(
    config: &WikiConfig,
    args: &JobArgs,
    client: &MediaWikiClient,
) -> Result<(MoveOptions, JobHooks)> {
    let table = client.namespaces();
    let mut options = config.move_pages.to_options(table)?;
    args.apply(&mut options, client)?;
    let hooks = JobHooks {
        replacers: config.move_pages.parameter_replacers(table)?,
        ..JobHooks::default()
    };
    Ok((options, hooks))
}

fn print_report(runtime: &RuntimeOptions, report: &MoveReport) -> Result<()> {
    if runtime.json {
        print_json(report)
    } else {
        print!("{}", report.render_text());
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to serialize JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn print_rows(rows: &[ReplacementRow]) {
    println!("replacements: {}", rows.len());
    for row in rows {
        let mut line = format!("  - {} -> {} [{}]", row.from, row.to, row.actions.join(", "));
        if !row.reason.is_empty() {
            line.push(' ');
            line.push_str(&row.reason);
        }
        println!("{line}");
    }
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("warnings:");
    for warning in warnings {
        println!("  - {warning}");
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
