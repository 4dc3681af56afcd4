use super::Host;
use super::ProgressReporter;
use super::config::Config;
use super::logging::{OutputArgs, init_logging};
use crate::Result;
use crate::harvest::checkpoint::CheckpointSink;
use crate::harvest::client::FetchClient;
use crate::harvest::collector::Collector;
use crate::harvest::dataset::{CollectionStats, HarvestDocument};
use crate::harvest::json_file;
use crate::harvest::run_lock::acquire_run_lock;
use crate::harvest::safety::{RuntimeContext, SafetyGate};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use owo_colors::OwoColorize;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "   collect";

/// How long a run must last before the progress bar appears.
const PROGRESS_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser, Debug, Default)]
pub struct CollectArgs {
    /// Path to configuration file (default is `kol-harvest.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Where to write the collected document (overrides `output_path`)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Where to write the progress checkpoint (overrides `checkpoint_path`)
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<Utf8PathBuf>,

    /// Collect only these configured projects
    #[arg(long, value_name = "ID", value_delimiter = ',')]
    pub only: Vec<String>,

    /// Keep projects that the existing output already holds complete data for
    #[arg(long)]
    pub resume: bool,

    /// Start immediately, skipping the confirmation countdown
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Deployment environment name; production environments are refused
    #[arg(long, value_name = "NAME", env = "KOL_HARVEST_ENV")]
    pub environment: Option<String>,

    /// Host name checked against the configured production domains (default is this machine's name)
    #[arg(long, value_name = "NAME")]
    pub hostname: Option<String>,

    #[command(flatten)]
    pub output_args: OutputArgs,
}

pub async fn collect<H: Host>(host: &mut H, args: &CollectArgs) -> Result<()> {
    init_logging(args.output_args.log_level);

    match collect_inner(host, args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = writeln!(host.error(), "❌ Collection failed: {e}");
            host.exit(1);
            Err(e)
        }
    }
}

async fn collect_inner<H: Host>(host: &mut H, args: &CollectArgs) -> Result<()> {
    let config = Config::load(Utf8Path::new("."), args.config.as_ref())?;

    let context = RuntimeContext::new(args.environment.clone(), args.hostname.clone());
    SafetyGate::new(&config.production_domains)
        .check(&context)
        .map_err(|violation| app_err!("{violation}"))?;

    let mut plan = config.plan();
    if !args.only.is_empty() {
        let unknown = plan.retain_projects(&args.only);
        if !unknown.is_empty() {
            return Err(app_err!("unknown project(s) in --only: {}", unknown.join(", ")));
        }
    }

    if plan.project_count() == 0 {
        return Err(app_err!("no projects to collect; add project IDs to the [projects] section of the configuration"));
    }

    let output = args.output.clone().unwrap_or_else(|| config.output_path.clone());
    let checkpoint = args.checkpoint.clone().unwrap_or_else(|| config.checkpoint_path.clone());
    let items = plan.work_items().len();

    if let Some(parent) = output.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{parent}'"))?;
    }

    if !args.yes && !config.confirm_delay.is_zero() {
        let _ = writeln!(
            host.output(),
            "About to collect {items} leaderboards for {} projects into '{output}'. Starting in {}s, press Ctrl-C to abort.",
            plan.project_count(),
            config.confirm_delay.as_secs()
        );
        tokio::time::sleep(config.confirm_delay).await;
    }

    let _lock = acquire_run_lock(output.as_std_path()).await?;

    let previous = if output.exists() {
        let doc: HarvestDocument = json_file::load(&output, "previous output")?;
        log::info!(target: LOG_TARGET, "Building on '{output}' written at {}", doc.last_update);
        Some(doc)
    } else {
        None
    };

    let rate = config.rate_controller();
    let client = FetchClient::new(config.gateway()?, rate.clone(), config.rate.max_attempts)?;
    let progress = ProgressReporter::new(PROGRESS_DELAY, args.output_args.color.for_stderr());

    let mut collector = Collector::new(client, rate, Arc::new(progress))
        .with_checkpoints(CheckpointSink::to_file(checkpoint.as_std_path()))
        .with_snapshots(output.as_std_path());
    if let Some(previous) = previous {
        collector = if args.resume {
            collector.resume_from(previous)
        } else {
            collector.merge_into(previous)
        };
    }

    let started = Instant::now();
    let doc = collector.run(&plan).await;
    json_file::save_atomic(&doc, &output)?;

    let size = fs::metadata(&output).map(|m| m.len()).unwrap_or_default();
    let use_colors = args.output_args.color.for_stdout();
    write_summary(&mut host.output(), &doc.stats, started.elapsed(), &output, size, use_colors);

    Ok(())
}

fn write_summary(out: &mut impl Write, stats: &CollectionStats, elapsed: Duration, output: &Utf8Path, size: u64, use_colors: bool) {
    let failed = stats.failed_requests.to_string();
    let failed = if use_colors && stats.failed_requests > 0 {
        failed.red().to_string()
    } else {
        failed
    };

    let heading = if use_colors {
        "Collection complete".bold().green().to_string()
    } else {
        "Collection complete".to_string()
    };

    let _ = writeln!(out, "{heading} in {:.1}s", elapsed.as_secs_f64());
    let _ = writeln!(out, "  Successful requests: {}", stats.successful_requests);
    let _ = writeln!(out, "  Failed requests:     {failed}");
    let _ = writeln!(out, "  Skipped projects:    {}", stats.skipped_projects);
    let _ = writeln!(out, "  KOL records:         {}", stats.total_kols);
    let _ = writeln!(out, "  Data points:         {}", stats.total_data_points);
    let _ = writeln!(out, "  Unique users:        {}", stats.unique_users);
    let _ = writeln!(out, "  Output:              {output} ({:.1} KiB)", size as f64 / 1024.0);
}
