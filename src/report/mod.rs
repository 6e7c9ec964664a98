// SPDX-License-Identifier: PMPL-1.0-or-later

//! Report reducer
//!
//! A separate pass over the working directory: copy the surviving evidence
//! into the report directory, rebuild per-case failure counts from it, and
//! render an index page plus one page per package.

pub mod collect;
pub mod console;
pub mod html;

use crate::config::{StressConfig, BLACKLIST_FILE, LEDGER_FILE};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub use collect::{collect_failures, sync_report_dir, FailureMap, FailureRecord};
pub use console::print_summary;

/// Per-package line of the report summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub package: String,
    pub page: String,
    pub cases: usize,
    pub failing_cases: usize,
    pub failed_reruns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub generated_at: String,
    pub report_dir: PathBuf,
    pub reruns: usize,
    pub copied_files: usize,
    pub packages: Vec<PackageSummary>,
}

impl ReportSummary {
    pub fn failing_packages(&self) -> usize {
        self.packages.iter().filter(|p| p.failing_cases > 0).count()
    }

    pub fn total_cases(&self) -> usize {
        self.packages.iter().map(|p| p.cases).sum()
    }

    pub fn failing_cases(&self) -> usize {
        self.packages.iter().map(|p| p.failing_cases).sum()
    }
}

/// Run the whole reducer for `config.work_dir`.
pub fn generate_report(config: &StressConfig) -> Result<ReportSummary> {
    let report_dir = config.report_dir();
    let extension = &config.source_extension;

    let copied_files = sync_report_dir(&config.work_dir, &report_dir, extension)?;
    let failures = collect_failures(&report_dir, extension, config.reruns)?;
    let packages = write_pages(&report_dir, &failures, config.reruns)?;

    tracing::info!(
        report = %report_dir.display(),
        copied_files,
        packages = packages.len(),
        "report written"
    );
    Ok(ReportSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        report_dir,
        reruns: config.reruns,
        copied_files,
        packages,
    })
}

fn write_pages(
    report_dir: &Path,
    failures: &FailureMap,
    reruns: usize,
) -> Result<Vec<PackageSummary>> {
    remove_old_pages(report_dir)?;

    let links = html::IndexLinks {
        blacklist: report_dir
            .join(BLACKLIST_FILE)
            .is_file()
            .then_some(BLACKLIST_FILE),
        ledger: report_dir.join(LEDGER_FILE).is_file().then_some(LEDGER_FILE),
    };
    write_page(
        &report_dir.join(html::INDEX_FILE),
        &html::render_index(failures, &links),
    )?;

    let mut packages = Vec::with_capacity(failures.len());
    for (package, cases) in failures {
        let page = html::package_page_name(package);
        write_page(
            &report_dir.join(&page),
            &html::render_package(package, cases, reruns),
        )?;
        packages.push(PackageSummary {
            package: package.clone(),
            page,
            cases: cases.len(),
            failing_cases: cases.values().filter(|r| r.failures > 0).count(),
            failed_reruns: cases.values().map(|r| r.failures).sum(),
        });
    }
    Ok(packages)
}

/// Pages of packages that have since disappeared must not linger.
fn remove_old_pages(report_dir: &Path) -> Result<()> {
    let entries = fs::read_dir(report_dir)
        .with_context(|| format!("reading report directory {}", report_dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("reading report directory {}", report_dir.display()))?
            .path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("html") {
            fs::remove_file(&path)
                .with_context(|| format!("removing old page {}", path.display()))?;
        }
    }
    Ok(())
}

fn write_page(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("writing report page {}", path.display()))
}
