// SPDX-License-Identifier: PMPL-1.0-or-later

//! Survey configuration and toolchain profiles.
//!
//! `StressConfig` is assembled once from the command line and then only ever
//! borrowed. The toolchain profile describes how to drive the external
//! compiler and linker and can be loaded from JSON or YAML.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const BLACKLIST_FILE: &str = "blacklist";
pub const LEDGER_FILE: &str = "result.file";
pub const RECORD_FILE: &str = "survey.json";
pub const REPORT_DIR: &str = "report";
pub const RUN_DIR: &str = "work";
pub const BINARY_NAME: &str = "test";
pub const ISOLATED_ROOT_DIR: &str = "root.stdstress";

#[derive(Debug, Clone, PartialEq)]
pub struct StressConfig {
    /// Concurrent invocations per generated stress program.
    pub iters: usize,
    /// Independent build+run repetitions per case.
    pub reruns: usize,
    /// `None` waits for the program however long it takes.
    pub timeout: Option<Duration>,
    /// Degree of parallelism handed to the toolchain and the stress binary.
    pub build_jobs: usize,
    /// Upper bound on in-flight workers in a package-suite program.
    pub max_workers: usize,
    pub work_dir: PathBuf,
    pub source_extension: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            iters: 100,
            reruns: 10,
            timeout: Some(Duration::from_secs(600)),
            build_jobs: 10,
            max_workers: 64,
            work_dir: PathBuf::from("."),
            source_extension: "go".to_string(),
        }
    }
}

impl StressConfig {
    /// Zero seconds disables the timeout.
    pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.work_dir.join(BLACKLIST_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.work_dir.join(LEDGER_FILE)
    }

    pub fn record_path(&self) -> PathBuf {
        self.work_dir.join(RECORD_FILE)
    }

    pub fn report_dir(&self) -> PathBuf {
        self.work_dir.join(REPORT_DIR)
    }

    /// Directory the stress binary is linked into and executed from.
    pub fn run_dir(&self) -> PathBuf {
        self.work_dir.join(RUN_DIR)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.run_dir().join(BINARY_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iters == 0 {
            return Err(anyhow!("--iters must be at least 1"));
        }
        if self.reruns == 0 {
            return Err(anyhow!("--reruns must be at least 1"));
        }
        if self.build_jobs == 0 {
            return Err(anyhow!("--build-jobs must be at least 1"));
        }
        if self.max_workers < 2 {
            return Err(anyhow!("--max-workers must be at least 2"));
        }
        if self.source_extension.is_empty() || self.source_extension.contains('.') {
            return Err(anyhow!(
                "source extension '{}' must be a bare extension",
                self.source_extension
            ));
        }
        Ok(())
    }
}

/// How to invoke the external compiler and linker.
///
/// Argument templates understand `{src}`, `{obj}` and `{out}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainProfile {
    pub compiler: PathBuf,
    pub compile_args: Vec<String>,
    pub linker: PathBuf,
    pub link_args: Vec<String>,
    /// Appended to the source filename to name the object file.
    pub object_suffix: String,
    /// Environment variable pointing the tools at the isolated root.
    pub root_env: String,
    /// Environment variable carrying the concurrency degree.
    pub jobs_env: String,
    /// Isolated toolchain root; defaults to `<work-dir>/root.stdstress`.
    pub isolated_root: Option<PathBuf>,
    pub source_extension: String,
    /// Packages never surveyed, whatever the blacklist says.
    pub disabled_packages: Vec<String>,
}

impl Default for ToolchainProfile {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from("6g"),
            compile_args: vec![
                "-e".to_string(),
                "-o".to_string(),
                "{obj}".to_string(),
                "{src}".to_string(),
            ],
            linker: PathBuf::from("6l"),
            link_args: vec!["-o".to_string(), "{out}".to_string(), "{obj}".to_string()],
            object_suffix: "6".to_string(),
            root_env: "GOROOT".to_string(),
            jobs_env: "GOMAXPROCS".to_string(),
            isolated_root: None,
            source_extension: "go".to_string(),
            disabled_packages: Vec::new(),
        }
    }
}

impl ToolchainProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading toolchain profile {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("parsing json toolchain profile {}", path.display())),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("parsing yaml toolchain profile {}", path.display())),
            _ => Err(anyhow!(
                "unsupported toolchain profile extension for {}",
                path.display()
            )),
        }
    }

    /// Resolve tool locations from `GOARCH`, `GOBIN` and `GOROOT` the way
    /// the classic toolchain lays itself out.
    pub fn detect() -> Self {
        let mut profile = Self::default();
        let (compiler, linker, suffix) = match env::var("GOARCH").as_deref() {
            Ok("amd64") => ("6g", "6l", "6"),
            Ok("arm") => ("5g", "5l", "5"),
            _ => ("8g", "8l", "8"),
        };
        let bin_dir = env::var_os("GOBIN")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| env::var_os("GOROOT").map(|root| PathBuf::from(root).join("bin")));
        profile.compiler = tool_path(bin_dir.as_deref(), compiler);
        profile.linker = tool_path(bin_dir.as_deref(), linker);
        profile.object_suffix = suffix.to_string();
        profile
    }

    pub fn isolated_root(&self, work_dir: &Path) -> PathBuf {
        self.isolated_root
            .clone()
            .unwrap_or_else(|| work_dir.join(ISOLATED_ROOT_DIR))
    }

    pub fn is_disabled(&self, package: &str) -> bool {
        self.disabled_packages.iter().any(|p| p == package)
    }
}

fn tool_path(bin_dir: Option<&Path>, tool: &str) -> PathBuf {
    match bin_dir {
        Some(dir) => dir.join(tool),
        None => PathBuf::from(tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn zero_timeout_disables_it() {
        assert_eq!(StressConfig::timeout_from_secs(0), None);
        assert_eq!(
            StressConfig::timeout_from_secs(3),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn validate_rejects_zero_reruns() {
        let config = StressConfig {
            reruns: 0,
            ..StressConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(StressConfig::default().validate().is_ok());
    }

    #[test]
    fn yaml_profile_overrides_only_given_fields() {
        let dir = TempDir::new().expect("tempdir should create");
        let path = dir.path().join("toolchain.yaml");
        fs::write(
            &path,
            "compiler: /opt/go/bin/6g\ndisabled_packages:\n  - smtp\n  - os/signal\n",
        )
        .expect("profile should write");

        let profile = ToolchainProfile::load(&path).expect("profile should load");
        assert_eq!(profile.compiler, PathBuf::from("/opt/go/bin/6g"));
        assert_eq!(profile.linker, PathBuf::from("6l"));
        assert!(profile.is_disabled("os/signal"));
        assert!(!profile.is_disabled("sort"));
    }

    #[test]
    fn unknown_profile_extension_is_rejected() {
        let dir = TempDir::new().expect("tempdir should create");
        let path = dir.path().join("toolchain.toml");
        fs::write(&path, "compiler = 'x'").expect("profile should write");
        assert!(ToolchainProfile::load(&path).is_err());
    }
}
