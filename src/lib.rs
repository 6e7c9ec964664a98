// SPDX-License-Identifier: PMPL-1.0-or-later

//! stdstress: concurrent stress surveys of a standard library's own tests.
//!
//! For every test, benchmark and whole package discovered in a built source
//! tree, a small program is generated that runs that code from many
//! goroutines at once. The program is compiled, linked and run under a
//! timeout, several times over, and each failing rerun leaves its log on
//! disk. A separate report pass turns those files into HTML.
//!
//! Pipeline:
//! 1. **discovery**: packages and their case names
//! 2. **synth**: stress program source per case and rerun
//! 3. **build**: compile and link through a [`build::Toolchain`]
//! 4. **supervisor**: run with a timeout race
//! 5. **survey**: the sequential controller and the results ledger
//! 6. **report**: rebuild results from disk and render them

pub mod build;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod naming;
pub mod report;
pub mod supervisor;
pub mod survey;
pub mod synth;
pub mod types;

pub use config::{StressConfig, ToolchainProfile};
pub use types::{CaseKind, LedgerEntry, PackageSuite, PackageUnit, RunOutcome, TestCase};
