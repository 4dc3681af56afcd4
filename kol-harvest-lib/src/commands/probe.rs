use super::Host;
use super::config::Config;
use super::logging::{OutputArgs, init_logging};
use crate::Result;
use crate::harvest::client::FetchClient;
use crate::harvest::plan::{Category, Period, WorkItem};
use crate::harvest::record::RankingRecord;
use crate::harvest::safety::{RuntimeContext, SafetyGate};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ohno::app_err;
use std::io::Write;
use std::time::Instant;

#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Project ID to query
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Leaderboard window to query
    #[arg(long, short = 'd', value_name = "DURATION", default_value = "7d")]
    pub duration: Period,

    /// Path to configuration file (default is `kol-harvest.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Deployment environment name; production environments are refused
    #[arg(long, value_name = "NAME", env = "KOL_HARVEST_ENV")]
    pub environment: Option<String>,

    /// Host name checked against the configured production domains (default is this machine's name)
    #[arg(long, value_name = "NAME")]
    pub hostname: Option<String>,

    #[command(flatten)]
    pub output_args: OutputArgs,
}

/// Make a single challenge, proof and leaderboard round trip and report what came back.
pub async fn probe<H: Host>(host: &mut H, args: &ProbeArgs) -> Result<()> {
    init_logging(args.output_args.log_level);

    match probe_inner(host, args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = writeln!(host.error(), "❌ Probe failed: {e}");
            host.exit(1);
            Err(e)
        }
    }
}

async fn probe_inner<H: Host>(host: &mut H, args: &ProbeArgs) -> Result<()> {
    let config = Config::load(Utf8Path::new("."), args.config.as_ref())?;

    let context = RuntimeContext::new(args.environment.clone(), args.hostname.clone());
    SafetyGate::new(&config.production_domains)
        .check(&context)
        .map_err(|violation| app_err!("{violation}"))?;

    let client = FetchClient::new(config.gateway()?, config.rate_controller(), 1)?;

    let item = WorkItem {
        project_id: args.project.clone(),
        category: Category::PreTge,
        period: args.duration,
    };

    let started = Instant::now();
    let rows = client.fetch_once(&item).await.map_err(|e| app_err!("{e}"))?;
    let records = RankingRecord::from_rows(&rows);

    let _ = writeln!(
        host.output(),
        "Fetched {} records for {} ({}) in {}ms",
        records.len(),
        args.project,
        args.duration,
        started.elapsed().as_millis()
    );

    if let Some(top) = records.first() {
        let _ = writeln!(
            host.output(),
            "Top entry: #{} {} (@{}), mindshare {}",
            top.rank,
            top.display_name,
            top.username,
            top.mindshare
        );
    }

    Ok(())
}
