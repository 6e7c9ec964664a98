// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core type definitions for stdstress
//!
//! A survey works over packages of the library under test, each of which
//! yields a fixed, ordered list of cases (tests, then benchmarks, then the
//! whole-package suite). Everything here is immutable once discovery is done.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One library under test, e.g. `container/list`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageUnit {
    name: String,
    flat: String,
}

impl PackageUnit {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let flat = flatten_name(&name);
        Self { name, flat }
    }

    /// Qualified, slash-separated package path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package path with slashes replaced, safe for identifiers and filenames.
    pub fn flat_name(&self) -> &str {
        &self.flat
    }

    /// Last path segment, the name the package declares for itself.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for PackageUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub fn flatten_name(name: &str) -> String {
    name.replace('/', "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Test,
    Benchmark,
    PackageSuite,
}

impl CaseKind {
    pub fn label(&self) -> &'static str {
        match self {
            CaseKind::Test => "test",
            CaseKind::Benchmark => "benchmark",
            CaseKind::PackageSuite => "package",
        }
    }
}

/// A package together with the test and benchmark names extracted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSuite {
    pub package: PackageUnit,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub benchmarks: Vec<String>,
}

impl PackageSuite {
    pub fn new(package: PackageUnit, tests: Vec<String>, benchmarks: Vec<String>) -> Self {
        Self {
            package,
            tests,
            benchmarks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty() && self.benchmarks.is_empty()
    }

    /// Cases in survey order: tests, benchmarks, then the package suite.
    ///
    /// Ordinals count tests and benchmarks together so two cases of one
    /// package never share a filename; the package suite always gets 0.
    pub fn cases(&self) -> Vec<TestCase> {
        let mut cases = Vec::with_capacity(self.tests.len() + self.benchmarks.len() + 1);
        let named = self
            .tests
            .iter()
            .map(|name| (CaseKind::Test, name))
            .chain(self.benchmarks.iter().map(|name| (CaseKind::Benchmark, name)));
        for (ordinal, (kind, name)) in named.enumerate() {
            cases.push(TestCase {
                package: self.package.clone(),
                kind,
                name: name.clone(),
                ordinal,
            });
        }
        cases.push(TestCase {
            package: self.package.clone(),
            kind: CaseKind::PackageSuite,
            name: String::new(),
            ordinal: 0,
        });
        cases
    }
}

/// One unit of work: a test, a benchmark, or a whole package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestCase {
    pub package: PackageUnit,
    pub kind: CaseKind,
    /// Empty for [`CaseKind::PackageSuite`].
    pub name: String,
    pub ordinal: usize,
}

impl TestCase {
    /// Name used in the ledger: the bare case name, or the package name for a suite.
    pub fn ledger_name(&self) -> &str {
        match self.kind {
            CaseKind::PackageSuite => self.package.name(),
            _ => &self.name,
        }
    }

    /// Fully qualified `package.Case` name; suites use `package.head`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package.name(), self.identity_case())
    }

    pub(crate) fn identity_case(&self) -> &str {
        match self.kind {
            CaseKind::PackageSuite => crate::naming::SUITE_CASE_NAME,
            _ => &self.name,
        }
    }
}

/// Classified result of one rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Passed,
    CompileFailed,
    LinkFailed,
    RuntimeFailed,
    TimedOut,
    SpawnFailed,
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, RunOutcome::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Passed => "passed",
            RunOutcome::CompileFailed => "compile failed",
            RunOutcome::LinkFailed => "link failed",
            RunOutcome::RuntimeFailed => "runtime failed",
            RunOutcome::TimedOut => "timed out",
            RunOutcome::SpawnFailed => "spawn failed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One `name:failures` line of the results ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub name: String,
    pub failures: usize,
}

impl LedgerEntry {
    pub fn new(name: impl Into<String>, failures: usize) -> Self {
        Self {
            name: name.into(),
            failures,
        }
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_name_replaces_every_slash() {
        let pkg = PackageUnit::new("compress/flate/internal");
        assert_eq!(pkg.flat_name(), "compress_flate_internal");
        assert_eq!(pkg.short_name(), "internal");
    }

    #[test]
    fn cases_follow_survey_order_with_shared_ordinals() {
        let suite = PackageSuite::new(
            PackageUnit::new("sort"),
            vec!["TestSort".into(), "TestReverse".into()],
            vec!["BenchmarkSort".into()],
        );
        let cases = suite.cases();
        let summary: Vec<_> = cases
            .iter()
            .map(|c| (c.kind, c.ledger_name().to_string(), c.ordinal))
            .collect();
        assert_eq!(
            summary,
            vec![
                (CaseKind::Test, "TestSort".to_string(), 0),
                (CaseKind::Test, "TestReverse".to_string(), 1),
                (CaseKind::Benchmark, "BenchmarkSort".to_string(), 2),
                (CaseKind::PackageSuite, "sort".to_string(), 0),
            ]
        );
        assert_eq!(cases[3].full_name(), "sort.head");
    }

    #[test]
    fn only_a_clean_pass_is_not_a_failure() {
        assert!(RunOutcome::TimedOut.is_failure());
        assert!(RunOutcome::CompileFailed.is_failure());
        assert!(!RunOutcome::Passed.is_failure());
    }
}
