// SPDX-License-Identifier: PMPL-1.0-or-later

//! Discovery: which packages exist, which cases they declare, and staging
//! of their prebuilt test archives into the isolated toolchain root.
//!
//! Every failure here is fatal to the run; nothing can be surveyed without
//! package metadata.

pub mod descriptor;

pub use descriptor::DescriptorParser;

use crate::config::ToolchainProfile;
use crate::types::{PackageSuite, PackageUnit};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Directory whose presence marks its parent as a built package.
pub const TEST_DIR_MARKER: &str = "_test";
/// Registration descriptor generated next to the marker directory.
pub const DESCRIPTOR_FILE: &str = "_testmain.go";
const ARCHIVE_EXTENSION: &str = "a";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("source root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("walking source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("reading descriptor {}: {source}", .path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading manifest {}: {message}", .path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("staging {}: {source}", .path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to stage archives into the real toolchain root {}", .0.display())]
    RootCollision(PathBuf),

    #[error("packages {first} and {second} would share the file prefix {flat}")]
    FlatNameCollision {
        first: String,
        second: String,
        flat: String,
    },

    #[error("invalid descriptor pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Every directory containing a `_test` subdirectory, sorted.
pub fn discover_package_dirs(src_root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !src_root.is_dir() {
        return Err(DiscoveryError::NotADirectory(src_root.to_path_buf()));
    }
    let mut dirs = Vec::new();
    for entry in WalkDir::new(src_root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() && entry.file_name() == TEST_DIR_MARKER {
            if let Some(parent) = entry.path().parent() {
                dirs.push(parent.to_path_buf());
            }
        }
    }
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

/// Slash-separated package name of `package_dir` relative to `src_root`.
pub fn package_name(src_root: &Path, package_dir: &Path) -> String {
    let relative = package_dir.strip_prefix(src_root).unwrap_or(package_dir);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Discover every package under `src_root` and its cases. Disabled packages
/// and packages with nothing to run are left out.
pub fn discover_suites(
    src_root: &Path,
    profile: &ToolchainProfile,
) -> Result<Vec<PackageSuite>, DiscoveryError> {
    let parser = DescriptorParser::new()?;
    let mut suites = Vec::new();
    for dir in discover_package_dirs(src_root)? {
        let name = package_name(src_root, &dir);
        if profile.is_disabled(&name) {
            tracing::info!(package = %name, "skipping disabled package");
            continue;
        }
        let path = dir.join(DESCRIPTOR_FILE);
        let descriptor = fs::read_to_string(&path)
            .map_err(|source| DiscoveryError::Descriptor { path, source })?;
        let suite = parser.extract(&descriptor, &PackageUnit::new(name));
        if suite.is_empty() {
            tracing::debug!(package = %suite.package, "no runnable cases");
            continue;
        }
        suites.push(suite);
    }
    check_flat_names(&suites)?;
    tracing::info!(packages = suites.len(), root = %src_root.display(), "discovery finished");
    Ok(suites)
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    package: String,
    #[serde(default)]
    tests: Vec<String>,
    #[serde(default)]
    benchmarks: Vec<String>,
}

/// Read a JSON or YAML list of `{package, tests, benchmarks}`, in place of
/// walking a source tree.
pub fn load_manifest(path: &Path) -> Result<Vec<PackageSuite>, DiscoveryError> {
    let manifest_error = |message: String| DiscoveryError::Manifest {
        path: path.to_path_buf(),
        message,
    };
    let content = fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
    let entries: Vec<ManifestEntry> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| manifest_error(e.to_string()))?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| manifest_error(e.to_string()))?
        }
        _ => return Err(manifest_error("unsupported manifest extension".to_string())),
    };
    let suites: Vec<PackageSuite> = entries
        .into_iter()
        .map(|e| PackageSuite::new(PackageUnit::new(e.package), e.tests, e.benchmarks))
        .filter(|suite| !suite.is_empty())
        .collect();
    check_flat_names(&suites)?;
    Ok(suites)
}

/// Generated filenames and report pages are keyed by the flat name, so two
/// packages may not flatten to the same one (`a/b` and `a_b`).
pub fn check_flat_names(suites: &[PackageSuite]) -> Result<(), DiscoveryError> {
    let mut seen: HashMap<&str, &str> = HashMap::with_capacity(suites.len());
    for suite in suites {
        let package = &suite.package;
        if let Some(first) = seen.insert(package.flat_name(), package.name()) {
            return Err(DiscoveryError::FlatNameCollision {
                first: first.to_string(),
                second: package.name().to_string(),
                flat: package.flat_name().to_string(),
            });
        }
    }
    Ok(())
}

/// `<os>_<arch>` in the toolchain's own spelling.
pub fn toolchain_platform() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{}_{}", os, arch)
}

/// Copy each package's prebuilt `*.a` test archives into
/// `<isolated_root>/pkg/<os>_<arch>/<package parent>/`. Returns the number
/// of archives copied.
pub fn stage_archives(
    src_root: &Path,
    package_dirs: &[PathBuf],
    isolated_root: &Path,
    real_root: &Path,
) -> Result<usize, DiscoveryError> {
    if same_location(isolated_root, real_root) {
        return Err(DiscoveryError::RootCollision(isolated_root.to_path_buf()));
    }
    let platform_dir = isolated_root.join("pkg").join(toolchain_platform());
    let mut staged = 0;
    for dir in package_dirs {
        let name = package_name(src_root, dir);
        let target = match name.rsplit_once('/') {
            Some((parent, _)) => platform_dir.join(parent),
            None => platform_dir.clone(),
        };
        fs::create_dir_all(&target).map_err(|source| DiscoveryError::Staging {
            path: target.clone(),
            source,
        })?;
        for entry in WalkDir::new(dir.join(TEST_DIR_MARKER)) {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION)
            {
                continue;
            }
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let dest = target.join(file_name);
            fs::copy(path, &dest).map_err(|source| DiscoveryError::Staging {
                path: dest.clone(),
                source,
            })?;
            staged += 1;
        }
    }
    tracing::info!(staged, root = %isolated_root.display(), "staged test archives");
    Ok(staged)
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
