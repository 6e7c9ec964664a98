// SPDX-License-Identifier: PMPL-1.0-or-later

//! End-to-end survey and report runs against a fake toolchain.
//!
//! The fake "links" every program to the system `true` or `false` binary,
//! so runs pass or fail without any compiler installed.

#![cfg(unix)]

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use stdstress::build::{BuildError, Toolchain};
use stdstress::report;
use stdstress::supervisor::Supervisor;
use stdstress::survey::{self, Survey, BUILD_FAILED_MARKER};
use stdstress::{LedgerEntry, PackageSuite, PackageUnit, RunOutcome, StressConfig};
use tempfile::TempDir;

fn system_binary(name: &str) -> PathBuf {
    ["/bin", "/usr/bin"]
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|path| path.exists())
        .unwrap_or_else(|| panic!("no {} binary on this system", name))
}

#[derive(Default)]
struct FakeToolchain {
    /// Sources whose name starts with this link to `false`.
    failing_prefix: Option<String>,
    fail_compile: bool,
    fail_link: bool,
    links: Cell<usize>,
}

impl Toolchain for FakeToolchain {
    fn compile(&self, source: &Path) -> Result<PathBuf, BuildError> {
        if self.fail_compile {
            return Err(BuildError::CompileFailed {
                source_file: source.to_path_buf(),
                status: "exit status: 2".to_string(),
                diagnostics: "undefined: stress_sort.TestSort".to_string(),
            });
        }
        let mut object = source.as_os_str().to_os_string();
        object.push(".o");
        let object = PathBuf::from(object);
        fs::write(&object, b"object").expect("object should write");
        Ok(object)
    }

    fn link(&self, object: &Path, _output: &Path) -> Result<PathBuf, BuildError> {
        self.links.set(self.links.get() + 1);
        if self.fail_link {
            return Err(BuildError::LinkFailed {
                object: object.to_path_buf(),
                status: "exit status: 1".to_string(),
                diagnostics: "undefined reference".to_string(),
            });
        }
        let name = object
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let fails = self
            .failing_prefix
            .as_deref()
            .is_some_and(|prefix| name.starts_with(prefix));
        Ok(system_binary(if fails { "false" } else { "true" }))
    }
}

fn sort_suite() -> PackageSuite {
    PackageSuite::new(
        PackageUnit::new("sort"),
        vec!["TestSort".into(), "TestReverse".into()],
        vec![],
    )
}

fn config(dir: &Path) -> StressConfig {
    StressConfig {
        iters: 4,
        reruns: 3,
        timeout: None,
        work_dir: dir.to_path_buf(),
        ..StressConfig::default()
    }
}

#[test]
fn sort_survey_writes_ledger_and_report() {
    let dir = TempDir::new().expect("tempdir should create");
    let config = config(dir.path());
    let toolchain = FakeToolchain {
        failing_prefix: Some("sTestsort-1_".to_string()),
        ..Default::default()
    };
    let supervisor = Supervisor::new(config.timeout);

    let mut console = Vec::new();
    let summary = Survey::new(&config, &toolchain, &supervisor)
        .console(&mut console)
        .run(&[sort_suite()])
        .expect("survey should run");
    let console = String::from_utf8(console).expect("console output is utf-8");
    let lines: Vec<&str> = console.lines().collect();
    assert_eq!(lines.len(), 3 * config.reruns);
    for (case, verdict) in [
        ("sort.TestSort", "passed"),
        ("sort.TestReverse", "failed"),
        ("sort.head", "passed"),
    ] {
        for rerun in 0..config.reruns {
            let prefix = format!("{} rerun {}, ", case, rerun);
            let line = lines
                .iter()
                .find(|l| l.starts_with(&prefix))
                .unwrap_or_else(|| panic!("no status line for {}", prefix));
            assert!(line.contains(verdict), "{} should be {}", line, verdict);
        }
    }
    assert_eq!(summary.results.len(), 3);
    assert_eq!(summary.failing_cases(), 1);
    assert_eq!(summary.count(RunOutcome::RuntimeFailed), 3);

    let ledger = survey::read_ledger(&config.ledger_path()).expect("ledger should read");
    assert_eq!(
        ledger,
        vec![
            LedgerEntry::new("TestSort", 0),
            LedgerEntry::new("TestReverse", 3),
            LedgerEntry::new("sort", 0),
        ]
    );
    for entry in &ledger {
        assert!(entry.failures <= config.reruns);
    }
    // objects are cleaned up after each run
    assert!(!dir.path().join("sTestsort-0_0.go.o").exists());
    assert_eq!(
        survey::recorded_reruns(dir.path(), 10).expect("record should read"),
        config.reruns
    );

    let report = report::generate_report(&config).expect("report should generate");
    assert_eq!(report.packages.len(), 1);
    assert_eq!(report.packages[0].failing_cases, 1);

    let page = fs::read_to_string(config.report_dir().join("sort.html")).expect("sort page");
    let reverse = page
        .lines()
        .find(|l| l.contains(">TestReverse<"))
        .expect("TestReverse row");
    assert_eq!(reverse.matches("#FF0000").count(), 3);
    assert!(reverse.contains("sTestsort-1_2.go.output"));
    let sort = page.lines().find(|l| l.contains(">TestSort<")).expect("TestSort row");
    assert_eq!(sort.matches("#00FF00").count(), 3);
    assert!(config.report_dir().join("sTestsort-1_0.go").exists());
    assert!(config.report_dir().join("result.file").exists());
}

#[test]
fn blacklisted_package_is_never_built() {
    let dir = TempDir::new().expect("tempdir should create");
    let config = config(dir.path());
    fs::write(config.blacklist_path(), "# skip the whole package\nsort\n")
        .expect("blacklist should write");
    let toolchain = FakeToolchain::default();
    let supervisor = Supervisor::new(None);

    let mut console = Vec::new();
    let summary = Survey::new(&config, &toolchain, &supervisor)
        .console(&mut console)
        .run(&[sort_suite()])
        .expect("survey should run");
    assert_eq!(summary.skipped, vec!["sort.TestSort", "sort.TestReverse", "sort.head"]);
    let console = String::from_utf8(console).expect("console output is utf-8");
    let lines: Vec<&str> = console.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, case) in lines.iter().zip(&summary.skipped) {
        assert!(line.starts_with(&format!("{}, ", case)));
        assert!(line.contains("skipped"));
    }
    assert!(summary.results.is_empty());
    assert_eq!(toolchain.links.get(), 0);
    assert!(survey::read_ledger(&config.ledger_path())
        .expect("ledger should read")
        .is_empty());
}

#[test]
fn single_blacklisted_case_leaves_the_rest() {
    let dir = TempDir::new().expect("tempdir should create");
    let config = config(dir.path());
    fs::write(config.blacklist_path(), "sort.TestReverse\n").expect("blacklist should write");
    let toolchain = FakeToolchain::default();
    let supervisor = Supervisor::new(None);

    let summary = Survey::new(&config, &toolchain, &supervisor)
        .quiet(true)
        .run(&[sort_suite()])
        .expect("survey should run");
    assert_eq!(summary.skipped, vec!["sort.TestReverse"]);
    let names: Vec<String> = survey::read_ledger(&config.ledger_path())
        .expect("ledger should read")
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["TestSort", "sort"]);
}

#[test]
fn compile_failures_count_every_rerun() {
    let dir = TempDir::new().expect("tempdir should create");
    let config = config(dir.path());
    let toolchain = FakeToolchain {
        fail_compile: true,
        ..Default::default()
    };
    let supervisor = Supervisor::new(None);

    let summary = Survey::new(&config, &toolchain, &supervisor)
        .quiet(true)
        .run(&[sort_suite()])
        .expect("survey should run");
    for result in &summary.results {
        assert_eq!(result.failures(), config.reruns);
        assert!(result
            .outcomes
            .iter()
            .all(|o| *o == RunOutcome::CompileFailed));
    }
    assert_eq!(toolchain.links.get(), 0);

    let log = fs::read_to_string(dir.path().join("sTestsort-0_1.go.output"))
        .expect("build failure leaves a log");
    assert!(log.starts_with(BUILD_FAILED_MARKER));
    assert!(log.contains("undefined: stress_sort.TestSort"));

    let report = report::generate_report(&config).expect("report should generate");
    assert_eq!(report.failing_cases(), 3);
}

#[test]
fn foreign_helper_is_left_out_of_ledger_and_report() {
    let dir = TempDir::new().expect("tempdir should create");
    let mut config = config(dir.path());
    config.reruns = 2;
    let suite = PackageSuite::new(
        PackageUnit::new("sort"),
        vec!["TestSort".into(), "testing.TestHelper".into()],
        vec![],
    );
    let toolchain = FakeToolchain::default();
    let supervisor = Supervisor::new(None);

    let summary = Survey::new(&config, &toolchain, &supervisor)
        .quiet(true)
        .run(&[suite])
        .expect("survey should run");
    assert_eq!(summary.refused, vec!["testing.TestHelper"]);
    assert_eq!(summary.failing_cases(), 0);
    assert_eq!(toolchain.links.get(), 2 * config.reruns);
    assert!(!dir.path().join("sTestsort-1_0.go").exists());

    let ledger = survey::read_ledger(&config.ledger_path()).expect("ledger should read");
    assert_eq!(
        ledger,
        vec![LedgerEntry::new("TestSort", 0), LedgerEntry::new("sort", 0)]
    );

    let report = report::generate_report(&config).expect("report should generate");
    let packages: Vec<&str> = report.packages.iter().map(|p| p.package.as_str()).collect();
    assert_eq!(packages, vec!["sort"]);
    assert_eq!(report.packages[0].cases, 2);
    assert_eq!(report.failing_cases(), 0);
    let page = fs::read_to_string(config.report_dir().join("sort.html")).expect("sort page");
    assert!(!page.contains("TestHelper"));
}

#[test]
fn link_failure_is_counted_and_leaves_no_object() {
    let dir = TempDir::new().expect("tempdir should create");
    let config = config(dir.path());
    let toolchain = FakeToolchain {
        fail_link: true,
        ..Default::default()
    };
    let supervisor = Supervisor::new(None);

    let summary = Survey::new(&config, &toolchain, &supervisor)
        .quiet(true)
        .run(&[sort_suite()])
        .expect("survey should run");
    assert_eq!(summary.count(RunOutcome::LinkFailed), 3 * config.reruns);
    assert!(!dir.path().join("sTestsort-0_0.go.o").exists());
    let log = fs::read_to_string(dir.path().join("pTestsort_2.go.output"))
        .expect("link failure leaves a log");
    assert!(log.starts_with(&format!("{} (link)", BUILD_FAILED_MARKER)));
}

#[test]
fn report_is_byte_identical_when_regenerated() {
    let dir = TempDir::new().expect("tempdir should create");
    let config = config(dir.path());
    let toolchain = FakeToolchain {
        failing_prefix: Some("pTestsort_".to_string()),
        ..Default::default()
    };
    let supervisor = Supervisor::new(None);
    Survey::new(&config, &toolchain, &supervisor)
        .quiet(true)
        .run(&[sort_suite()])
        .expect("survey should run");

    report::generate_report(&config).expect("first report");
    let index = fs::read(config.report_dir().join("index.html")).expect("index");
    let page = fs::read(config.report_dir().join("sort.html")).expect("page");

    report::generate_report(&config).expect("second report");
    assert_eq!(
        fs::read(config.report_dir().join("index.html")).expect("index"),
        index
    );
    assert_eq!(
        fs::read(config.report_dir().join("sort.html")).expect("page"),
        page
    );
}

#[test]
fn new_survey_discards_previous_evidence() {
    let dir = TempDir::new().expect("tempdir should create");
    let mut config = config(dir.path());
    let supervisor = Supervisor::new(None);
    let failing = FakeToolchain {
        failing_prefix: Some("sTestsort-0_".to_string()),
        ..Default::default()
    };
    Survey::new(&config, &failing, &supervisor)
        .quiet(true)
        .run(&[sort_suite()])
        .expect("first survey should run");
    assert!(dir.path().join("sTestsort-0_2.go.output").exists());

    config.reruns = 1;
    let passing = FakeToolchain::default();
    Survey::new(&config, &passing, &supervisor)
        .quiet(true)
        .run(&[sort_suite()])
        .expect("second survey should run");
    assert!(!dir.path().join("sTestsort-0_2.go.output").exists());
    assert!(!dir.path().join("sTestsort-0_2.go").exists());

    let report = report::generate_report(&config).expect("report should generate");
    assert_eq!(report.failing_cases(), 0);
}
