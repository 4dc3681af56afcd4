#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for kol-harvest
//!
//! Collects KOL mindshare leaderboards from a gateway that guards its data behind a
//! proof-of-work challenge, and aggregates them into a single document.
//!
//! # Module Organization
//!
//! - [`commands`]: Command-line interface and orchestration
//! - [`harvest`]: Proof of work, pacing, fetching and aggregation

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

#[cfg(any(debug_assertions, test))]
pub mod harvest;
#[cfg(not(any(debug_assertions, test)))]
mod harvest;

pub use crate::commands::{Host, run};
