//! Leaderboard collection behind the gateway's proof-of-work gate.
//!
//! # Implementation Model
//!
//! A [`plan::CollectionPlan`] enumerates `(project, period)` work items. The
//! [`collector::Collector`] walks them strictly one at a time, asking a
//! [`client::LeaderboardSource`] for each leaderboard. The production source,
//! [`client::FetchClient`], fetches a challenge, solves it with [`pow`], and
//! sends the data request with the proof attached. Failures are classified into
//! [`rate::ErrorKind`]s, and [`rate::RateController`] decides how long to back
//! off before the next attempt.
//!
//! Rows are normalized into [`record::RankingRecord`]s and folded into the
//! [`dataset::HarvestDocument`], which also indexes every user across all
//! leaderboards. Progress is persisted as [`checkpoint::CollectionCheckpoint`]s
//! after every item and as document snapshots after every project.
//!
//! Before anything runs, [`safety::SafetyGate`] refuses production hosts and
//! [`run_lock`] keeps two collectors from writing the same output.

pub mod checkpoint;
pub mod client;
pub mod collector;
pub mod dataset;
pub mod error;
pub mod json_file;
pub mod plan;
pub mod pow;
pub mod progress;
pub mod rate;
pub mod record;
pub mod run_lock;
pub mod safety;

pub use progress::Progress;
