// SPDX-License-Identifier: PMPL-1.0-or-later

//! Rebuild survey results from files on disk.
//!
//! Nothing here looks at in-memory survey state. The report directory is
//! first brought in line with the working directory, then scanned: each
//! case is found through the identity line of its lowest-rerun source, and
//! its failure count is the number of failure logs sharing that source's
//! stem.

use crate::config::{BLACKLIST_FILE, LEDGER_FILE};
use crate::naming::{self, FileRole};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Everything the report knows about one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Generated source the identity was read from.
    pub origin: String,
    pub failures: usize,
    /// Failure log filenames, ordered by rerun.
    pub failure_logs: Vec<String>,
}

/// package -> case -> record, both levels sorted by name.
pub type FailureMap = BTreeMap<String, BTreeMap<String, FailureRecord>>;

/// Make `report_dir` hold exactly the working directory's generated
/// sources and failure logs, plus the blacklist and ledger when present.
/// Returns the number of files copied.
pub fn sync_report_dir(work_dir: &Path, report_dir: &Path, extension: &str) -> Result<usize> {
    fs::create_dir_all(report_dir)
        .with_context(|| format!("creating report directory {}", report_dir.display()))?;

    let wanted = generated_files(work_dir, extension)?;
    for stale in generated_files(report_dir, extension)?.difference(&wanted) {
        let path = report_dir.join(stale);
        fs::remove_file(&path)
            .with_context(|| format!("removing stale report file {}", path.display()))?;
    }

    let mut copied = 0;
    let extras = [BLACKLIST_FILE, LEDGER_FILE];
    for name in wanted.iter().map(String::as_str).chain(extras) {
        let from = work_dir.join(name);
        if !from.is_file() {
            continue;
        }
        let to = report_dir.join(name);
        fs::copy(&from, &to).with_context(|| {
            format!("copying {} into {}", from.display(), report_dir.display())
        })?;
        copied += 1;
    }
    Ok(copied)
}

/// Scan `dir` and rebuild the failure map. Counts are clamped to `reruns`.
pub fn collect_failures(dir: &Path, extension: &str, reruns: usize) -> Result<FailureMap> {
    // stem -> (rerun, filename) of the earliest surviving source
    let mut origins: BTreeMap<String, (usize, String)> = BTreeMap::new();
    // stem -> (rerun, filename) of every failure log
    let mut logs: BTreeMap<String, BTreeSet<(usize, String)>> = BTreeMap::new();

    for name in generated_files(dir, extension)? {
        match naming::classify(&name, extension) {
            Some(FileRole::Source { stem, rerun }) => {
                let keep = origins
                    .get(&stem)
                    .map_or(true, |(earliest, _)| rerun < *earliest);
                if keep {
                    origins.insert(stem, (rerun, name));
                }
            }
            Some(FileRole::FailureLog { stem, rerun }) => {
                logs.entry(stem).or_default().insert((rerun, name));
            }
            None => {}
        }
    }

    let mut map = FailureMap::new();
    for (stem, (_, origin)) in origins {
        let path = dir.join(&origin);
        let Some(identity) = read_identity(&path)? else {
            tracing::warn!(file = %path.display(), "generated source has no identity line, ignoring");
            continue;
        };
        let failure_logs: Vec<String> = logs
            .remove(&stem)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        let record = FailureRecord {
            origin,
            failures: failure_logs.len().min(reruns),
            failure_logs,
        };
        map.entry(identity.package)
            .or_default()
            .insert(identity.case, record);
    }

    for stem in logs.keys() {
        tracing::debug!(stem = %stem, "failure logs without a source, ignoring");
    }
    Ok(map)
}

fn generated_files(dir: &Path, extension: &str) -> Result<BTreeSet<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("reading directory {}", dir.display()))?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if naming::classify(name, extension).is_some() {
                names.insert(name.to_string());
            }
        }
    }
    Ok(names)
}

fn read_identity(path: &Path) -> Result<Option<naming::CaseIdentity>> {
    let file =
        fs::File::open(path).with_context(|| format!("opening source {}", path.display()))?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .with_context(|| format!("reading identity line of {}", path.display()))?;
    Ok(naming::parse_identity(&first))
}
