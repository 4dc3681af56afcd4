//! Command-line interface and orchestration for kol-harvest
//!
//! # Commands
//!
//! - **collect**: Check that the host is allowed to collect, then walk every
//!   configured `(project, duration)` pair through the gateway and write the
//!   resulting document, with checkpoints and per-project snapshots along the way
//! - **probe**: One challenge, proof and leaderboard request, for checking that the
//!   gateway still accepts our proofs
//! - **init**: Generate a default configuration file
//! - **validate**: Check configuration file syntax and values
//!
//! Configuration is a TOML file listing the projects per category, the durations to
//! collect, the gateway endpoints and the pacing policy.

mod collect;
mod config;
mod host;
mod init;
mod logging;
mod probe;
mod progress_reporter;
mod run;
mod validate;

#[cfg(debug_assertions)]
pub use config::Config;

pub use collect::{CollectArgs, collect};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use logging::{ColorMode, LogLevel, OutputArgs};
pub use probe::{ProbeArgs, probe};
pub use progress_reporter::ProgressReporter;
pub use run::run;
pub use validate::{ValidateArgs, validate_config};
