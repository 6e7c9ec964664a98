// SPDX-License-Identifier: PMPL-1.0-or-later

//! Extraction of test and benchmark names from a package's generated
//! registration descriptor (`_testmain.go`).
//!
//! Only two declarations matter:
//!
//! ```text
//! var tests = []testing.InternalTest{
//!     {"sort.TestSort", sort.TestSort},
//! }
//! var benchmarks = []testing.InternalBenchmark{
//!     {"sort.BenchmarkSort", sort.BenchmarkSort},
//! }
//! ```

use super::DiscoveryError;
use crate::synth;
use crate::types::{PackageSuite, PackageUnit};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Tests,
    Benchmarks,
}

pub struct DescriptorParser {
    table_start: Regex,
    entry: Regex,
}

impl DescriptorParser {
    pub fn new() -> Result<Self, DiscoveryError> {
        Ok(Self {
            table_start: Regex::new(
                r"^\s*var\s+(tests|benchmarks)\s*=\s*\[\]testing\.Internal(?:Test|Benchmark)\s*\{",
            )?,
            entry: Regex::new(r#"\{\s*"([^"]+)"\s*,"#)?,
        })
    }

    /// Names declared by `package` itself. Entries registered under another
    /// package are external helpers and are skipped with a warning.
    pub fn extract(&self, descriptor: &str, package: &PackageUnit) -> PackageSuite {
        let mut tests = Vec::new();
        let mut benchmarks = Vec::new();
        let mut current: Option<(Table, i64)> = None;

        for line in descriptor.lines() {
            let (table, depth) = match current {
                Some(state) => state,
                None => match self.table_start.captures(line) {
                    Some(caps) if &caps[1] == "tests" => (Table::Tests, 0),
                    Some(_) => (Table::Benchmarks, 0),
                    None => continue,
                },
            };

            for caps in self.entry.captures_iter(line) {
                let raw = &caps[1];
                let Some(name) = owned_entry(package, raw) else {
                    continue;
                };
                match table {
                    Table::Tests => tests.push(name.to_string()),
                    Table::Benchmarks => benchmarks.push(name.to_string()),
                }
            }

            let depth = depth + brace_balance(line);
            current = (depth > 0).then_some((table, depth));
        }

        PackageSuite::new(package.clone(), tests, benchmarks)
    }
}

fn owned_entry<'a>(package: &PackageUnit, raw: &'a str) -> Option<&'a str> {
    if !raw.contains('.') {
        tracing::warn!(package = %package, entry = raw, "unqualified descriptor entry, skipping");
        return None;
    }
    match synth::owned_case_name(package, raw) {
        Ok(name) => Some(name),
        Err(err) => {
            tracing::warn!(package = %package, entry = raw, "skipping external test: {err}");
            None
        }
    }
}

/// Case names never contain braces, so counting them is enough.
fn brace_balance(line: &str) -> i64 {
    line.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}
