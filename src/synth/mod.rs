// SPDX-License-Identifier: PMPL-1.0-or-later

//! Stress program synthesis.
//!
//! Each program imports the package under test and drives its test or
//! benchmark functions from many goroutines at once, so that the same body
//! races against itself inside one process.

mod templates;

use crate::config::StressConfig;
use crate::naming;
use crate::types::{CaseKind, PackageSuite, PackageUnit, TestCase};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filename of the combined runner program.
pub const RUNNER_FILE_STEM: &str = "stress_runner";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthError {
    #[error("{name} is declared outside package {package}")]
    ForeignCase { package: String, name: String },

    #[error("{name:?} is not a valid function name")]
    InvalidName { name: String },

    #[error("package {package} has no tests or benchmarks to run")]
    NothingToRun { package: String },
}

/// Source text for one generated program plus the name it is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressProgram {
    pub file_name: String,
    pub source: String,
}

impl StressProgram {
    pub fn write_to(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        fs::write(&path, self.source.as_bytes())
            .with_context(|| format!("writing stress program {}", path.display()))?;
        Ok(path)
    }
}

/// Build the program for one rerun of `case`.
///
/// `suite` supplies the full test and benchmark lists for package-suite cases.
pub fn synthesize(
    case: &TestCase,
    suite: &PackageSuite,
    rerun: usize,
    config: &StressConfig,
) -> Result<StressProgram, SynthError> {
    let file_name = naming::source_file_name(case, rerun, &config.source_extension);
    let identity = naming::identity_line(case);
    let source = match case.kind {
        CaseKind::Test | CaseKind::Benchmark => {
            let name = owned_case_name(&case.package, &case.name)?;
            templates::single_case(&identity, &case.package, case.kind, name, config.iters)
        }
        CaseKind::PackageSuite => {
            let tests = owned_names(&suite.package, &suite.tests);
            let benchmarks = owned_names(&suite.package, &suite.benchmarks);
            if tests.is_empty() && benchmarks.is_empty() {
                return Err(SynthError::NothingToRun {
                    package: suite.package.name().to_string(),
                });
            }
            templates::package_suite(
                &identity,
                &suite.package,
                &tests,
                &benchmarks,
                config.iters,
                config.max_workers,
            )
        }
    };
    Ok(StressProgram { file_name, source })
}

/// Whether `case` can become a program at all: a named case must belong to
/// its own package and a suite must own at least one name.
pub fn check_runnable(case: &TestCase, suite: &PackageSuite) -> Result<(), SynthError> {
    match case.kind {
        CaseKind::Test | CaseKind::Benchmark => {
            owned_case_name(&case.package, &case.name).map(|_| ())
        }
        CaseKind::PackageSuite => {
            let owns_any = suite
                .tests
                .iter()
                .chain(&suite.benchmarks)
                .any(|name| owned_case_name(&suite.package, name).is_ok());
            if owns_any {
                Ok(())
            } else {
                Err(SynthError::NothingToRun {
                    package: suite.package.name().to_string(),
                })
            }
        }
    }
}

/// Build the open-ended soak program covering every package at once.
pub fn synthesize_runner(suites: &[PackageSuite], config: &StressConfig) -> StressProgram {
    let runnable: Vec<(&PackageUnit, Vec<&str>, Vec<&str>)> = suites
        .iter()
        .map(|suite| {
            (
                &suite.package,
                owned_names(&suite.package, &suite.tests),
                owned_names(&suite.package, &suite.benchmarks),
            )
        })
        .filter(|(_, tests, benchmarks)| !tests.is_empty() || !benchmarks.is_empty())
        .collect();
    StressProgram {
        file_name: format!("{}.{}", RUNNER_FILE_STEM, config.source_extension),
        source: templates::combined_runner(&runnable),
    }
}

/// Accept `Name` or `<package>.Name`; anything qualified by another package
/// is an externally defined helper and is refused.
pub fn owned_case_name<'a>(package: &PackageUnit, raw: &'a str) -> Result<&'a str, SynthError> {
    let name = match raw.split_once('.') {
        Some((prefix, rest)) if prefix == package.short_name() => rest,
        Some(_) => {
            return Err(SynthError::ForeignCase {
                package: package.name().to_string(),
                name: raw.to_string(),
            })
        }
        None => raw,
    };
    if !is_identifier(name) {
        return Err(SynthError::InvalidName {
            name: raw.to_string(),
        });
    }
    Ok(name)
}

/// Filter a name list down to the names `package` owns, logging the rest.
pub fn owned_names<'a>(package: &PackageUnit, raw: &'a [String]) -> Vec<&'a str> {
    raw.iter()
        .filter_map(|name| match owned_case_name(package, name) {
            Ok(name) => Some(name),
            Err(err) => {
                tracing::warn!(package = %package, case = %name, "skipping case: {err}");
                None
            }
        })
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
