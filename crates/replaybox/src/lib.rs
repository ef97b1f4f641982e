//! replaybox: a deterministic record/replay regression harness for
//! interactive virtual-machine interpreters.
//!
//! A test case is a program plus two fixtures: the recorded player input
//! (`T.in`) and the accepted transcript (`T.out`). Verification replays the
//! input through a fresh interpreter, normalizes away volatile build tokens,
//! and compares the result with the baseline. Mismatches, faults, and missing
//! baselines leave the actual transcript in `T.fail`.

#![forbid(unsafe_code)]
// Library documentation is in progress. Public API types have docs;
// internal types will be documented in future releases.
#![allow(missing_docs)]
// Unit tests fail loudly instead of propagating errors.
#![cfg_attr(
    test,
    allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)
)]

pub mod artifacts;
pub mod channel;
pub mod compare;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod interpreter;
pub mod model;
pub mod provider;
pub mod runner;

pub use crate::model::*;

pub mod run {
    use super::config::{load_config_file, HarnessConfig};
    use super::runner::{Runner, RunnerResult};
    use super::{BatchReport, CaseReport};
    use std::path::Path;

    pub fn run_all(config: &HarnessConfig) -> RunnerResult<BatchReport> {
        Ok(Runner::from_config(config)?.run_all())
    }

    pub fn run_case(config: &HarnessConfig, name: &str) -> RunnerResult<CaseReport> {
        Runner::from_config(config)?.run_case(name)
    }

    pub fn run_config_file(path: &Path) -> RunnerResult<BatchReport> {
        run_all(&load_config_file(path)?)
    }
}
