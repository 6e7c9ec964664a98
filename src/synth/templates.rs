// SPDX-License-Identifier: PMPL-1.0-or-later

//! Source templates for generated stress programs.
//!
//! Output is already gofmt-shaped (tab indentation) so that the saved
//! sources are readable in the report without reformatting.

use crate::types::{CaseKind, PackageUnit};

const MATCH_STRING_FN: [&str; 3] = [
    "func matchString(pat, str string) (bool, error) {",
    "\treturn regexp.MatchString(pat, str)",
    "}",
];

pub(super) fn single_case(
    identity: &str,
    package: &PackageUnit,
    kind: CaseKind,
    name: &str,
    iters: usize,
) -> String {
    let alias = import_alias(package);
    let mut lines = header(identity);
    lines.extend(imports(&[package], kind != CaseKind::Benchmark));
    lines.extend(MATCH_STRING_FN.iter().map(|line| line.to_string()));
    lines.push(String::new());
    lines.push("func main() {".to_string());
    lines.push("\twg := new(sync.WaitGroup)".to_string());
    lines.push(format!("\tfor i := 0; i < {}; i++ {{", iters));
    lines.push("\t\twg.Add(1)".to_string());
    lines.push("\t\tgo func() {".to_string());
    lines.push("\t\t\tdefer wg.Done()".to_string());
    match kind {
        CaseKind::Benchmark => {
            lines.push("\t\t\tbenchmarks := []testing.InternalBenchmark{".to_string());
            lines.push(format!("\t\t\t\t{},", entry(package, &alias, name)));
            lines.push("\t\t\t}".to_string());
            lines.push("\t\t\ttesting.RunBenchmarks(matchString, benchmarks)".to_string());
        }
        CaseKind::Test | CaseKind::PackageSuite => {
            lines.push("\t\t\ttests := []testing.InternalTest{".to_string());
            lines.push(format!("\t\t\t\t{},", entry(package, &alias, name)));
            lines.push("\t\t\t}".to_string());
            lines.extend(run_tests_checked("\t\t\t"));
        }
    }
    lines.push("\t\t}()".to_string());
    lines.push("\t}".to_string());
    lines.push("\twg.Wait()".to_string());
    lines.push("}".to_string());
    finish(lines)
}

pub(super) fn package_suite(
    identity: &str,
    package: &PackageUnit,
    tests: &[&str],
    benchmarks: &[&str],
    iters: usize,
    max_workers: usize,
) -> String {
    let mut lines = header(identity);
    lines.extend(imports(&[package], true));
    lines.extend(MATCH_STRING_FN.iter().map(|line| line.to_string()));
    lines.push(String::new());
    lines.push("func main() {".to_string());
    lines.push("\twg := new(sync.WaitGroup)".to_string());
    lines.push(format!("\tslots := make(chan struct{{}}, {})", max_workers));
    lines.extend(case_tables(package, tests, benchmarks, "\t"));
    lines.push(format!("\tfor i := 0; i < {}; i++ {{", iters));
    lines.push("\t\twg.Add(2)".to_string());
    lines.push("\t\tslots <- struct{}{}".to_string());
    lines.push("\t\tgo func() {".to_string());
    lines.push("\t\t\tdefer func() { <-slots; wg.Done() }()".to_string());
    lines.extend(run_tests_checked("\t\t\t"));
    lines.push("\t\t}()".to_string());
    lines.push("\t\tslots <- struct{}{}".to_string());
    lines.push("\t\tgo func() {".to_string());
    lines.push("\t\t\tdefer func() { <-slots; wg.Done() }()".to_string());
    lines.push("\t\t\ttesting.RunBenchmarks(matchString, benchmarks)".to_string());
    lines.push("\t\t}()".to_string());
    lines.push("\t}".to_string());
    lines.push("\twg.Wait()".to_string());
    lines.push("}".to_string());
    finish(lines)
}

pub(super) fn combined_runner(packages: &[(&PackageUnit, Vec<&str>, Vec<&str>)]) -> String {
    let units: Vec<&PackageUnit> = packages.iter().map(|(package, _, _)| *package).collect();
    let mut lines = header("// stdstress.runner");
    lines.extend(imports(&units, true));
    lines.extend(MATCH_STRING_FN.iter().map(|line| line.to_string()));
    lines.push(String::new());
    lines.push("func main() {".to_string());
    lines.push("\twg := new(sync.WaitGroup)".to_string());
    for (package, tests, benchmarks) in packages {
        lines.push("\twg.Add(1)".to_string());
        lines.push("\tgo func() {".to_string());
        lines.push("\t\tdefer wg.Done()".to_string());
        lines.extend(case_tables(package, tests, benchmarks, "\t\t"));
        lines.push("\t\tfor {".to_string());
        lines.extend(run_tests_checked("\t\t\t"));
        lines.push("\t\t\ttesting.RunBenchmarks(matchString, benchmarks)".to_string());
        lines.push("\t\t}".to_string());
        lines.push("\t}()".to_string());
    }
    lines.push("\twg.Wait()".to_string());
    lines.push("}".to_string());
    finish(lines)
}

fn header(identity: &str) -> Vec<String> {
    vec![
        identity.to_string(),
        "//".to_string(),
        "package main".to_string(),
        String::new(),
    ]
}

/// `os` is only imported when the program checks test results.
fn imports(packages: &[&PackageUnit], with_os: bool) -> Vec<String> {
    let mut lines = vec!["import (".to_string()];
    if with_os {
        lines.push("\t\"os\"".to_string());
    }
    lines.push("\t\"regexp\"".to_string());
    lines.push("\t\"sync\"".to_string());
    lines.push("\t\"testing\"".to_string());
    if !packages.is_empty() {
        lines.push(String::new());
    }
    for package in packages {
        lines.push(format!("\t{} \"{}\"", import_alias(package), package.name()));
    }
    lines.push(")".to_string());
    lines.push(String::new());
    lines
}

fn case_tables(
    package: &PackageUnit,
    tests: &[&str],
    benchmarks: &[&str],
    indent: &str,
) -> Vec<String> {
    let alias = import_alias(package);
    let mut lines = vec![format!("{}tests := []testing.InternalTest{{", indent)];
    for name in tests {
        lines.push(format!("{}\t{},", indent, entry(package, &alias, name)));
    }
    lines.push(format!("{}}}", indent));
    lines.push(format!("{}benchmarks := []testing.InternalBenchmark{{", indent));
    for name in benchmarks {
        lines.push(format!("{}\t{},", indent, entry(package, &alias, name)));
    }
    lines.push(format!("{}}}", indent));
    lines
}

/// A failing test anywhere in the process must surface as a non-zero exit.
fn run_tests_checked(indent: &str) -> Vec<String> {
    vec![
        format!("{}if !testing.RunTests(matchString, tests) {{", indent),
        format!("{}\tos.Exit(1)", indent),
        format!("{}}}", indent),
    ]
}

fn entry(package: &PackageUnit, alias: &str, name: &str) -> String {
    format!("{{\"{}.{}\", {}.{}}}", package.name(), name, alias, name)
}

fn import_alias(package: &PackageUnit) -> String {
    let flat: String = package
        .flat_name()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("stress_{}", flat)
}

fn finish(lines: Vec<String>) -> String {
    let mut source = lines.join("\n");
    source.push('\n');
    source
}
