//! Command dispatch logic for kol-harvest

use super::{CollectArgs, InitArgs, ProbeArgs, ValidateArgs, collect, init_config, probe, validate_config};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "kol-harvest", version, author, long_about = None)]
#[command(about = "Collect KOL mindshare leaderboards from a proof-of-work protected gateway")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: HarvestSubcommand,
}

#[derive(Subcommand, Debug)]
enum HarvestSubcommand {
    /// Collect every configured project and duration into the output document
    Collect(Box<CollectArgs>),
    /// Make a single authenticated leaderboard request and show the result
    Probe(Box<ProbeArgs>),
    /// Generate a default configuration file
    Init(InitArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        HarvestSubcommand::Collect(collect_args) => collect(host, collect_args).await,
        HarvestSubcommand::Probe(probe_args) => probe(host, probe_args).await,
        HarvestSubcommand::Init(init_args) => init_config(host, init_args),
        HarvestSubcommand::Validate(validate_args) => validate_config(host, validate_args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::plan::Period;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_collect_flags() {
        let cli = Cli::try_parse_from([
            "kol-harvest",
            "collect",
            "--only",
            "A,B",
            "--resume",
            "--yes",
            "--output",
            "out.json",
            "--environment",
            "staging",
            "--hostname",
            "laptop.local",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let HarvestSubcommand::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(args.only, ["A", "B"]);
        assert!(args.resume);
        assert!(args.yes);
        assert_eq!(args.output.as_deref().map(|p| p.as_str()), Some("out.json"));
        assert_eq!(args.environment.as_deref(), Some("staging"));
        assert_eq!(args.hostname.as_deref(), Some("laptop.local"));
    }

    #[test]
    fn test_probe_duration() {
        let cli = Cli::try_parse_from(["kol-harvest", "probe", "APT", "--duration", "30d"]).unwrap();
        let HarvestSubcommand::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(args.project, "APT");
        assert_eq!(args.duration, Period::Days30);

        assert!(Cli::try_parse_from(["kol-harvest", "probe", "APT", "--duration", "2w"]).is_err());
    }
}
