// SPDX-License-Identifier: PMPL-1.0-or-later

//! Parameters of the last survey, kept next to its evidence so a later
//! report pass draws strips of the right width.

use crate::config::{StressConfig, RECORD_FILE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyRecord {
    pub started_at: String,
    pub reruns: usize,
    pub iters: usize,
    pub timeout_secs: Option<u64>,
}

impl SurveyRecord {
    pub fn from_config(config: &StressConfig) -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            reruns: config.reruns,
            iters: config.iters,
            timeout_secs: config.timeout.map(|t| t.as_secs()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing survey record {}", path.display()))
    }

    /// `None` when no survey has run in this directory.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading survey record {}", path.display()))
            }
        };
        let record = serde_json::from_str(&text)
            .with_context(|| format!("parsing survey record {}", path.display()))?;
        Ok(Some(record))
    }
}

/// Rerun count of the survey that left its evidence in `work_dir`, or
/// `fallback` when none is recorded.
pub fn recorded_reruns(work_dir: &Path, fallback: usize) -> Result<usize> {
    let path = work_dir.join(RECORD_FILE);
    match SurveyRecord::load(&path)? {
        Some(record) => Ok(record.reruns),
        None => {
            tracing::warn!(
                record = %path.display(),
                fallback,
                "no survey record, using default reruns"
            );
            Ok(fallback)
        }
    }
}
