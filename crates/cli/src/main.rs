use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use livedev_protocol::{ProjectEvent, ProjectFiles};
use livedev_tracker::TrackerEvent;
use report::{FailureReport, GraphReport};
use site::{Site, SiteOptions};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

mod report;
mod site;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/";

#[derive(Parser)]
#[command(name = "livedev")]
#[command(about = "Track LESS imports and follow edits live", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Tracker settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the import graph of a project
    Graph(GraphArgs),

    /// Track a project and re-analyse documents as they change
    Watch(WatchArgs),
}

#[derive(Args)]
struct ProjectArgs {
    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// File extensions to track (repeatable)
    #[arg(long = "ext", default_value = "less")]
    extensions: Vec<String>,

    /// URL the project is served under
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Include hidden files and directories
    #[arg(long)]
    hidden: bool,
}

#[derive(Args)]
struct GraphArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

impl ProjectArgs {
    fn into_options(self, config: Option<PathBuf>, watch: bool) -> SiteOptions {
        SiteOptions {
            root: self.path,
            extensions: self.extensions,
            base_url: self.base_url,
            config,
            include_hidden: self.hidden,
            watch,
            initial_analysis: watch,
        }
    }
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

    match cli.command {
        Commands::Graph(args) => run_graph(args, cli.config).await,
        Commands::Watch(args) => run_watch(args, cli.config).await,
    }
}

async fn run_graph(args: GraphArgs, config: Option<PathBuf>) -> Result<()> {
    // Every document is analysed below so failures end up in the report.
    let site = Site::open(args.project.into_options(config, false))?;
    let tracker = &site.tracker;

    tracker.reconcile().await.context("Failed to list project files")?;
    let paths = tracker.tracked_paths();
    let outcomes = join_all(paths.iter().map(|path| tracker.analyze(path))).await;
    let failures = paths
        .iter()
        .zip(outcomes)
        .filter_map(|(path, outcome)| {
            outcome.err().map(|err| FailureReport {
                path: site.relative(path),
                error: err.to_string(),
            })
        })
        .collect();

    let report = GraphReport::collect(&site, failures);
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        print!("{}", report.render_text());
    }

    tracker.shutdown();
    Ok(())
}

async fn run_watch(args: WatchArgs, config: Option<PathBuf>) -> Result<()> {
    let site = Site::open(args.project.into_options(config, true))?;
    let mut project_events = site.project.subscribe();
    let mut tracker_events = site.tracker.subscribe_events();

    let report = site
        .tracker
        .start()
        .await
        .context("Failed to start tracking")?;
    log::info!(
        "watching {} ({} documents, {} directories); press Ctrl-C to stop",
        site.root.display(),
        report.added.len(),
        site.project.watch_count()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = project_events.recv() => match event {
                Ok(ProjectEvent::FileModified(path)) => on_file_modified(&site, path).await,
                Ok(ProjectEvent::FilesChanged) => {}
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("missed {skipped} project events");
                }
                Err(RecvError::Closed) => break,
            },
            event = tracker_events.recv() => match event {
                Ok(event) => log_tracker_event(&site, &event),
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("missed {skipped} tracker events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    site.tracker.shutdown();
    let health = site.tracker.health_snapshot();
    log::info!(
        "stopped after {} analyses ({} failed)",
        health.analyses_run,
        health.analyses_failed
    );
    Ok(())
}

async fn on_file_modified(site: &Site, path: PathBuf) {
    match site.refresh(&path).await {
        Ok(true) => {
            let closure: Vec<String> = site
                .tracker
                .affected_closure(&path)
                .iter()
                .map(|path| site.relative(path))
                .collect();
            log::info!("{} changed, re-analysing {}", site.relative(&path), closure.join(", "));
        }
        Ok(false) => {}
        Err(err) => log::warn!("{err:#}"),
    }
}

fn log_tracker_event(site: &Site, event: &TrackerEvent) {
    match event {
        TrackerEvent::AnalysisSettled {
            path,
            result: Err(err),
            ..
        } => log::warn!("{}: {err}", site.relative(path)),
        TrackerEvent::AnalysisSettled { path, .. } => {
            let imports = site.tracker.references_to(path);
            log::debug!("{}: {} tracked import(s)", site.relative(path), imports.len());
        }
        TrackerEvent::UpdateSettled {
            path,
            runs,
            failures,
        } => log::info!(
            "{}: pushed to live sessions ({runs} run(s), {failures} failure(s))",
            site.relative(path)
        ),
        TrackerEvent::Reconciled { added, removed } if *added > 0 || *removed > 0 => {
            log::info!(
                "project changed: +{added} -{removed}, {} served from memory",
                site.server.filter_paths().len()
            );
        }
        _ => {}
    }
}
