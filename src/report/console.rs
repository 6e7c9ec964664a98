// SPDX-License-Identifier: PMPL-1.0-or-later

use super::ReportSummary;
use crate::types::LedgerEntry;
use colored::*;

/// Print the package table, then the failing ledger entries.
pub fn print_summary(report: &ReportSummary, ledger: &[LedgerEntry]) {
    println!("\n{}", "=== STDSTRESS REPORT ===".bold().cyan());
    println!(
        "Report: {}  |  Reruns per case: {}",
        report.report_dir.display(),
        report.reruns
    );
    println!(
        "Packages: {} ({} failing)  |  Cases: {}  |  Failing cases: {}",
        report.packages.len(),
        report.failing_packages(),
        report.total_cases(),
        report.failing_cases()
    );
    println!();

    if report.packages.is_empty() {
        println!("  No surveyed cases found.");
        return;
    }

    println!(
        "  {:<40} {:>6} {:>8} {:>8}  {}",
        "Package", "Cases", "Failing", "Fails", "Status"
    );
    println!("  {}", "-".repeat(74));
    for package in &report.packages {
        let status = if package.failing_cases > 0 {
            "FAILED".red().bold()
        } else {
            "PASSED".green()
        };
        println!(
            "  {:<40} {:>6} {:>8} {:>8}  {}",
            package.package, package.cases, package.failing_cases, package.failed_reruns, status
        );
    }

    let failing: Vec<&LedgerEntry> = ledger.iter().filter(|e| e.failures > 0).collect();
    if !failing.is_empty() {
        println!();
        println!("{}", "FAILING CASES (ledger)".bold().yellow());
        for entry in failing {
            println!(
                "  {:<40} {}",
                entry.name,
                format!("{}/{}", entry.failures, report.reruns).red()
            );
        }
    }
    println!();
}
