// SPDX-License-Identifier: PMPL-1.0-or-later

//! Deterministic names for generated programs and their failure logs.
//!
//! The survey and the report run as separate passes that share nothing but
//! the working directory, so the filenames are the contract between them:
//!
//! * single case source: `sTest<flat-package>-<ordinal>_<rerun>.<ext>`
//! * package suite source: `pTest<flat-package>_<rerun>.<ext>`
//! * failure log: `<source filename>.output`
//!
//! Everything before the final `_` is the *stem*, identical for every rerun
//! of one case. The first line of every generated source is an identity
//! comment `// <package>.<case>` (suites use the case name `head`).

use crate::types::{CaseKind, TestCase};

pub const SUITE_CASE_NAME: &str = "head";
pub const FAILURE_LOG_SUFFIX: &str = ".output";
pub const IDENTITY_PREFIX: &str = "// ";

const SINGLE_PREFIX: &str = "sTest";
const SUITE_PREFIX: &str = "pTest";

/// Filename stem shared by every rerun of `case`.
pub fn case_stem(case: &TestCase) -> String {
    match case.kind {
        CaseKind::PackageSuite => format!("{}{}", SUITE_PREFIX, case.package.flat_name()),
        CaseKind::Test | CaseKind::Benchmark => format!(
            "{}{}-{}",
            SINGLE_PREFIX,
            case.package.flat_name(),
            case.ordinal
        ),
    }
}

pub fn source_file_name(case: &TestCase, rerun: usize, extension: &str) -> String {
    format!("{}_{}.{}", case_stem(case), rerun, extension)
}

pub fn failure_log_name(source_file: &str) -> String {
    format!("{}{}", source_file, FAILURE_LOG_SUFFIX)
}

/// The first line of a generated program.
pub fn identity_line(case: &TestCase) -> String {
    format!("{}{}", IDENTITY_PREFIX, case.full_name())
}

/// Package and case recovered from an identity comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseIdentity {
    pub package: String,
    pub case: String,
}

/// Parse `// <package>.<case>`. Case names never contain dots, so the split
/// is on the last one; package paths may contain dots.
pub fn parse_identity(line: &str) -> Option<CaseIdentity> {
    let body = line.trim_end().strip_prefix(IDENTITY_PREFIX)?.trim();
    let (package, case) = body.rsplit_once('.')?;
    if package.is_empty() || case.is_empty() || case.contains(char::is_whitespace) {
        return None;
    }
    Some(CaseIdentity {
        package: package.to_string(),
        case: case.to_string(),
    })
}

/// What a working-directory file is, judged by name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRole {
    Source { stem: String, rerun: usize },
    FailureLog { stem: String, rerun: usize },
}

impl FileRole {
    pub fn stem(&self) -> &str {
        match self {
            FileRole::Source { stem, .. } | FileRole::FailureLog { stem, .. } => stem,
        }
    }
}

pub fn classify(file_name: &str, extension: &str) -> Option<FileRole> {
    if !(file_name.starts_with(SINGLE_PREFIX) || file_name.starts_with(SUITE_PREFIX)) {
        return None;
    }
    let source_suffix = format!(".{}", extension);
    if let Some(source) = file_name.strip_suffix(FAILURE_LOG_SUFFIX) {
        let base = source.strip_suffix(&source_suffix)?;
        let (stem, rerun) = split_rerun(base)?;
        return Some(FileRole::FailureLog { stem, rerun });
    }
    let base = file_name.strip_suffix(&source_suffix)?;
    let (stem, rerun) = split_rerun(base)?;
    Some(FileRole::Source { stem, rerun })
}

fn split_rerun(base: &str) -> Option<(String, usize)> {
    let (stem, digits) = base.rsplit_once('_')?;
    if stem.len() <= SINGLE_PREFIX.len() || digits.is_empty() {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rerun = digits.parse().ok()?;
    Some((stem.to_string(), rerun))
}
