// SPDX-License-Identifier: PMPL-1.0-or-later

//! The flat `name:failures` results file.

use crate::types::LedgerEntry;
use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends one line per finished case, flushed immediately so a crashed
/// survey still leaves every completed case on disk.
pub struct LedgerWriter {
    path: PathBuf,
    file: File,
}

impl LedgerWriter {
    /// Start a fresh ledger, truncating any previous one.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating results ledger {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn append(&mut self, entry: &LedgerEntry) -> Result<()> {
        writeln!(self.file, "{}", entry)
            .and_then(|_| self.file.flush())
            .with_context(|| format!("appending to results ledger {}", self.path.display()))
    }
}

pub fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading results ledger {}", path.display()))?;
    parse_ledger(&content)
}

pub fn parse_ledger(content: &str) -> Result<Vec<LedgerEntry>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let (name, count) = line
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("ledger line {} has no ':' separator", idx + 1))?;
            let failures = count
                .trim()
                .parse()
                .with_context(|| format!("ledger line {} has a bad failure count", idx + 1))?;
            Ok(LedgerEntry::new(name.trim(), failures))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn appended_entries_read_back_in_order() {
        let dir = TempDir::new().expect("tempdir should create");
        let path = dir.path().join("result.file");
        let mut ledger = LedgerWriter::create(&path).expect("ledger should create");
        ledger
            .append(&LedgerEntry::new("TestSort", 0))
            .expect("append should succeed");
        ledger
            .append(&LedgerEntry::new("sort", 3))
            .expect("append should succeed");

        assert_eq!(
            fs::read_to_string(&path).expect("ledger should read"),
            "TestSort:0\nsort:3\n"
        );
        let entries = read_ledger(&path).expect("ledger should parse");
        assert_eq!(
            entries,
            vec![LedgerEntry::new("TestSort", 0), LedgerEntry::new("sort", 3)]
        );
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(parse_ledger("TestSort\n").is_err());
        assert!(parse_ledger("TestSort:many\n").is_err());
        assert!(parse_ledger("\n\n").expect("blank ledger parses").is_empty());
    }
}
