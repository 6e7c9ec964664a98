// SPDX-License-Identifier: PMPL-1.0-or-later

//! Survey controller: every case of every package, `reruns` times over.
//!
//! Runs are strictly sequential. Each rerun reuses the same binary path and
//! run directory, so there is never more than one supervised process alive.
//! Every failed build or run leaves a `<source>.output` log next to its
//! source; the report pass counts those. Cases that cannot become a program
//! at all are refused up front and leave nothing behind.

pub mod blacklist;
pub mod ledger;
pub mod record;

pub use blacklist::Blacklist;
pub use ledger::{read_ledger, LedgerWriter};
pub use record::{recorded_reruns, SurveyRecord};

use crate::build::{self, BuildError, Toolchain};
use crate::config::StressConfig;
use crate::naming;
use crate::supervisor::Supervisor;
use crate::synth;
use crate::types::{LedgerEntry, PackageSuite, RunOutcome, TestCase};
use anyhow::{Context, Result};
use colored::*;
use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub const BUILD_FAILED_MARKER: &str = "STDSTRESS BUILD FAILED";

/// Per-rerun outcomes of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub case: TestCase,
    pub outcomes: Vec<RunOutcome>,
}

impl CaseResult {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn ledger_entry(&self) -> LedgerEntry {
        LedgerEntry::new(self.case.ledger_name(), self.failures())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveySummary {
    pub results: Vec<CaseResult>,
    /// Full names of blacklisted cases.
    pub skipped: Vec<String>,
    /// Names that cannot become a program, such as helpers declared by
    /// another package.
    pub refused: Vec<String>,
}

impl SurveySummary {
    pub fn failing_cases(&self) -> usize {
        self.results.iter().filter(|r| r.failures() > 0).count()
    }

    pub fn count(&self, outcome: RunOutcome) -> usize {
        self.results
            .iter()
            .flat_map(|r| r.outcomes.iter())
            .filter(|o| **o == outcome)
            .count()
    }
}

pub struct Survey<'a> {
    config: &'a StressConfig,
    toolchain: &'a dyn Toolchain,
    supervisor: &'a Supervisor,
    quiet: bool,
    console: RefCell<Box<dyn Write + 'a>>,
}

impl<'a> Survey<'a> {
    pub fn new(
        config: &'a StressConfig,
        toolchain: &'a dyn Toolchain,
        supervisor: &'a Supervisor,
    ) -> Self {
        Self {
            config,
            toolchain,
            supervisor,
            quiet: false,
            console: RefCell::new(Box::new(io::stdout())),
        }
    }

    /// Suppress the per-rerun console lines.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Send the per-rerun console lines somewhere other than stdout.
    pub fn console(mut self, out: impl Write + 'a) -> Self {
        self.console = RefCell::new(Box::new(out));
        self
    }

    /// Survey every suite in order. Only setup and ledger I/O errors abort.
    pub fn run(&self, suites: &[PackageSuite]) -> Result<SurveySummary> {
        let blacklist = Blacklist::load(&self.config.blacklist_path());
        tracing::info!(
            packages = suites.len(),
            blacklisted = blacklist.len(),
            reruns = self.config.reruns,
            "starting survey"
        );

        let removed = clear_previous_survey(&self.config.work_dir, &self.config.source_extension)?;
        if removed > 0 {
            tracing::debug!(removed, "removed files left by a previous survey");
        }
        let run_dir = self.config.run_dir();
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("creating run directory {}", run_dir.display()))?;
        SurveyRecord::from_config(self.config).save(&self.config.record_path())?;
        let mut ledger = LedgerWriter::create(&self.config.ledger_path())?;

        let mut summary = SurveySummary::default();
        for suite in suites {
            for case in suite.cases() {
                if let Err(err) = synth::check_runnable(&case, suite) {
                    tracing::warn!(
                        package = %case.package,
                        case = %case.ledger_name(),
                        "leaving case out: {err}"
                    );
                    summary.refused.push(case.ledger_name().to_string());
                    continue;
                }
                let full_name = case.full_name();
                if blacklist.skips(&full_name, case.package.name()) {
                    self.status(&format!("{}, {}", full_name, "skipped".yellow()));
                    summary.skipped.push(full_name);
                    continue;
                }
                let result = self.run_case(&case, suite)?;
                ledger.append(&result.ledger_entry())?;
                summary.results.push(result);
            }
        }

        tracing::info!(
            cases = summary.results.len(),
            failing = summary.failing_cases(),
            skipped = summary.skipped.len(),
            refused = summary.refused.len(),
            "survey finished"
        );
        Ok(summary)
    }

    /// All reruns of one case.
    pub fn run_case(&self, case: &TestCase, suite: &PackageSuite) -> Result<CaseResult> {
        let span = tracing::info_span!(
            "case",
            package = %case.package,
            kind = case.kind.label(),
            case = %case.ledger_name()
        );
        let _enter = span.enter();

        let mut outcomes = Vec::with_capacity(self.config.reruns);
        for rerun in 0..self.config.reruns {
            let outcome = self.run_once(case, suite, rerun)?;
            let verdict = if outcome.is_failure() {
                "failed".red()
            } else {
                "passed".green()
            };
            self.status(&format!("{} rerun {}, {}", case.full_name(), rerun, verdict));
            outcomes.push(outcome);
        }
        Ok(CaseResult {
            case: case.clone(),
            outcomes,
        })
    }

    /// Synthesize, build and supervise one rerun.
    fn run_once(&self, case: &TestCase, suite: &PackageSuite, rerun: usize) -> Result<RunOutcome> {
        let work_dir = &self.config.work_dir;
        let program = match synth::synthesize(case, suite, rerun, self.config) {
            Ok(program) => program,
            Err(err) => {
                tracing::warn!(rerun, %err, "could not synthesize stress program");
                return Ok(RunOutcome::CompileFailed);
            }
        };
        let log_path = work_dir.join(naming::failure_log_name(&program.file_name));
        remove_if_present(&log_path)?;
        let source_path = program.write_to(work_dir)?;

        let binary = self.config.binary_path();
        let artifact = match build::build(self.toolchain, &source_path, &binary) {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::warn!(rerun, stage = %err.stage(), %err, "stress program did not build");
                write_build_failure(&log_path, &err)?;
                return Ok(err.outcome());
            }
        };

        let env = self.toolchain.run_environment();
        let outcome = match self.supervisor.run(
            &artifact.executable,
            &self.config.run_dir(),
            &log_path,
            &env,
        ) {
            Ok(run) => {
                tracing::debug!(rerun, outcome = %run.outcome(), elapsed = ?run.elapsed, "run finished");
                run.outcome()
            }
            Err(err) => {
                tracing::warn!(rerun, %err, "could not supervise stress binary");
                RunOutcome::SpawnFailed
            }
        };

        if let Err(err) = fs::remove_file(&artifact.object) {
            tracing::debug!(object = %artifact.object.display(), %err, "object file not removed");
        }
        Ok(outcome)
    }

    fn status(&self, line: &str) {
        if self.quiet {
            return;
        }
        let mut console = self.console.borrow_mut();
        if let Err(err) = writeln!(console, "{}", line).and_then(|_| console.flush()) {
            tracing::debug!(%err, "could not write status line");
        }
    }
}

/// Remove generated sources and failure logs from an earlier survey so the
/// report only ever sees this survey's evidence.
pub fn clear_previous_survey(work_dir: &Path, extension: &str) -> Result<usize> {
    let entries = fs::read_dir(work_dir)
        .with_context(|| format!("reading working directory {}", work_dir.display()))?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("reading working directory {}", work_dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if naming::classify(name, extension).is_some() && entry.path().is_file() {
            remove_if_present(&entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing stale {}", path.display())),
    }
}

fn write_build_failure(log_path: &Path, err: &BuildError) -> Result<()> {
    let mut text = format!("{} ({}): {}\n", BUILD_FAILED_MARKER, err.stage(), err);
    text.push_str(err.diagnostics());
    fs::write(log_path, text)
        .with_context(|| format!("writing build failure log {}", log_path.display()))
}
