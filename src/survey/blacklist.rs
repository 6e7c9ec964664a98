// SPDX-License-Identifier: PMPL-1.0-or-later

//! Skip-list of cases and packages excluded from a survey.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Entries are either `package.Case` or a bare `package`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    entries: BTreeSet<String>,
}

impl Blacklist {
    /// A missing or unreadable file yields an empty blacklist.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "could not read blacklist, surveying everything");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { entries }
    }

    pub fn skips(&self, full_case_name: &str, package: &str) -> bool {
        self.entries.contains(full_case_name) || self.entries.contains(package)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn matches_full_name_or_package() {
        let list = Blacklist::parse("sort.TestSort\n# flaky on arm\n\n  container/list  \n");
        assert_eq!(list.len(), 2);
        assert!(list.skips("sort.TestSort", "sort"));
        assert!(!list.skips("sort.TestReverse", "sort"));
        assert!(list.skips("container/list.head", "container/list"));
        assert!(!list.skips("container/ring.TestRing", "container/ring"));
    }

    #[test]
    fn missing_file_is_an_empty_blacklist() {
        let dir = TempDir::new().expect("tempdir should create");
        let list = Blacklist::load(&dir.path().join("blacklist"));
        assert!(list.is_empty());
    }
}
