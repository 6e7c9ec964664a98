// SPDX-License-Identifier: PMPL-1.0-or-later

//! Build pipeline: compile, then link, against an isolated toolchain root.
//!
//! The two steps fail with distinct errors. Both count as one failed rerun,
//! but the failure log records which stage broke.

use crate::config::ToolchainProfile;
use crate::types::RunOutcome;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;

const MAX_TOOL_OUTPUT: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Compile,
    Link,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Compile => f.write_str("compile"),
            BuildStage::Link => f.write_str("link"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{} did not compile ({status})", .source_file.display())]
    CompileFailed {
        source_file: PathBuf,
        status: String,
        diagnostics: String,
    },

    #[error("{} did not link ({status})", .object.display())]
    LinkFailed {
        object: PathBuf,
        status: String,
        diagnostics: String,
    },

    #[error("could not launch {stage} tool {}: {source}", .tool.display())]
    Launch {
        stage: BuildStage,
        tool: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub fn stage(&self) -> BuildStage {
        match self {
            BuildError::CompileFailed { .. } => BuildStage::Compile,
            BuildError::LinkFailed { .. } => BuildStage::Link,
            BuildError::Launch { stage, .. } => *stage,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match self.stage() {
            BuildStage::Compile => RunOutcome::CompileFailed,
            BuildStage::Link => RunOutcome::LinkFailed,
        }
    }

    /// Tool output worth keeping in the failure log.
    pub fn diagnostics(&self) -> &str {
        match self {
            BuildError::CompileFailed { diagnostics, .. }
            | BuildError::LinkFailed { diagnostics, .. } => diagnostics,
            BuildError::Launch { .. } => "",
        }
    }
}

/// Compiled object and linked executable for one stress program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub object: PathBuf,
    pub executable: PathBuf,
}

/// The compiler/linker pair. Tool names and flags are a detail of the
/// implementation; callers only see the two operations.
pub trait Toolchain {
    /// Compile `source` and return the object file path.
    fn compile(&self, source: &Path) -> Result<PathBuf, BuildError>;

    /// Link `object` into an executable at `output`.
    fn link(&self, object: &Path, output: &Path) -> Result<PathBuf, BuildError>;

    /// Extra environment for the linked binary when it runs.
    fn run_environment(&self) -> Vec<(OsString, OsString)> {
        Vec::new()
    }
}

/// Compile then link. Linking is never attempted after a compile failure,
/// and the object does not outlive a failed link.
pub fn build(
    toolchain: &dyn Toolchain,
    source: &Path,
    output: &Path,
) -> Result<BuildArtifact, BuildError> {
    let object = toolchain.compile(source)?;
    match toolchain.link(&object, output) {
        Ok(executable) => Ok(BuildArtifact { object, executable }),
        Err(err) => {
            if let Err(remove_err) = std::fs::remove_file(&object) {
                tracing::debug!(object = %object.display(), %remove_err, "object file not removed");
            }
            Err(err)
        }
    }
}

/// Toolchain driven through external processes described by a profile.
#[derive(Debug, Clone)]
pub struct ExternalToolchain {
    profile: ToolchainProfile,
    isolated_root: PathBuf,
    work_dir: PathBuf,
    jobs: usize,
}

impl ExternalToolchain {
    pub fn new(
        profile: ToolchainProfile,
        isolated_root: PathBuf,
        work_dir: PathBuf,
        jobs: usize,
    ) -> Self {
        Self {
            profile,
            isolated_root,
            work_dir,
            jobs,
        }
    }

    /// Environment the tools and the stress binaries run with.
    pub fn environment(&self) -> Vec<(OsString, OsString)> {
        vec![
            (
                OsString::from(&self.profile.root_env),
                self.isolated_root.clone().into_os_string(),
            ),
            (
                OsString::from(&self.profile.jobs_env),
                OsString::from(self.jobs.to_string()),
            ),
        ]
    }

    pub fn object_path(&self, source: &Path) -> PathBuf {
        let mut name = source.as_os_str().to_os_string();
        name.push(".");
        name.push(&self.profile.object_suffix);
        PathBuf::from(name)
    }

    fn invoke(
        &self,
        stage: BuildStage,
        tool: &Path,
        templates: &[String],
        paths: &TemplatePaths<'_>,
    ) -> Result<Output, BuildError> {
        let args = templates
            .iter()
            .map(|arg| paths.expand(arg))
            .collect::<Vec<_>>();
        tracing::debug!(%stage, tool = %tool.display(), ?args, "invoking toolchain");
        Command::new(tool)
            .args(&args)
            .envs(self.environment())
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| BuildError::Launch {
                stage,
                tool: tool.to_path_buf(),
                source,
            })
    }
}

impl Toolchain for ExternalToolchain {
    fn compile(&self, source: &Path) -> Result<PathBuf, BuildError> {
        let source = absolute(source);
        let object = self.object_path(&source);
        let paths = TemplatePaths {
            src: &source,
            obj: &object,
            out: None,
        };
        let output = self.invoke(
            BuildStage::Compile,
            &self.profile.compiler,
            &self.profile.compile_args,
            &paths,
        )?;
        if !output.status.success() {
            return Err(BuildError::CompileFailed {
                source_file: source,
                status: output.status.to_string(),
                diagnostics: tool_diagnostics(&output),
            });
        }
        Ok(object)
    }

    fn link(&self, object: &Path, output_path: &Path) -> Result<PathBuf, BuildError> {
        let object = absolute(object);
        let out = absolute(output_path);
        let paths = TemplatePaths {
            src: &object,
            obj: &object,
            out: Some(&out),
        };
        let output = self.invoke(
            BuildStage::Link,
            &self.profile.linker,
            &self.profile.link_args,
            &paths,
        )?;
        if !output.status.success() {
            return Err(BuildError::LinkFailed {
                object,
                status: output.status.to_string(),
                diagnostics: tool_diagnostics(&output),
            });
        }
        Ok(out)
    }

    fn run_environment(&self) -> Vec<(OsString, OsString)> {
        self.environment()
    }
}

struct TemplatePaths<'a> {
    src: &'a Path,
    obj: &'a Path,
    out: Option<&'a Path>,
}

impl TemplatePaths<'_> {
    fn expand(&self, template: &str) -> String {
        let mut arg = template
            .replace("{src}", &self.src.to_string_lossy())
            .replace("{obj}", &self.obj.to_string_lossy());
        if let Some(out) = self.out {
            arg = arg.replace("{out}", &out.to_string_lossy());
        }
        arg
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn tool_diagnostics(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stdout));
    if text.len() > MAX_TOOL_OUTPUT {
        let mut cut = MAX_TOOL_OUTPUT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n...<truncated>");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct ScriptedToolchain {
        fail_compile: bool,
        fail_link: bool,
        calls: RefCell<Vec<BuildStage>>,
    }

    impl Toolchain for ScriptedToolchain {
        fn compile(&self, source: &Path) -> Result<PathBuf, BuildError> {
            self.calls.borrow_mut().push(BuildStage::Compile);
            if self.fail_compile {
                return Err(BuildError::CompileFailed {
                    source_file: source.to_path_buf(),
                    status: "exit status: 1".to_string(),
                    diagnostics: "syntax error".to_string(),
                });
            }
            Ok(source.with_extension("6"))
        }

        fn link(&self, object: &Path, output: &Path) -> Result<PathBuf, BuildError> {
            self.calls.borrow_mut().push(BuildStage::Link);
            if self.fail_link {
                return Err(BuildError::LinkFailed {
                    object: object.to_path_buf(),
                    status: "exit status: 1".to_string(),
                    diagnostics: "undefined: main.main".to_string(),
                });
            }
            Ok(output.to_path_buf())
        }
    }

    #[test]
    fn compile_failure_never_links() {
        let toolchain = ScriptedToolchain {
            fail_compile: true,
            ..Default::default()
        };
        let err = build(&toolchain, Path::new("a.go"), Path::new("work/test")).unwrap_err();
        assert_eq!(err.outcome(), RunOutcome::CompileFailed);
        assert_eq!(err.diagnostics(), "syntax error");
        assert_eq!(*toolchain.calls.borrow(), vec![BuildStage::Compile]);
    }

    #[test]
    fn successful_build_runs_both_stages_in_order() {
        let toolchain = ScriptedToolchain::default();
        let artifact = build(&toolchain, Path::new("a.go"), Path::new("work/test"))
            .expect("build should succeed");
        assert_eq!(artifact.executable, PathBuf::from("work/test"));
        assert_eq!(
            *toolchain.calls.borrow(),
            vec![BuildStage::Compile, BuildStage::Link]
        );
    }

    #[test]
    fn failed_link_removes_the_object() {
        let dir = tempfile::TempDir::new().expect("tempdir should create");
        let source = dir.path().join("a.go");
        let object = dir.path().join("a.6");
        std::fs::write(&object, b"object").expect("object should write");
        let toolchain = ScriptedToolchain {
            fail_link: true,
            ..Default::default()
        };

        let err = build(&toolchain, &source, &dir.path().join("test")).unwrap_err();
        assert_eq!(err.outcome(), RunOutcome::LinkFailed);
        assert!(!object.exists());
    }

    #[test]
    fn environment_points_tools_at_isolated_root() {
        let toolchain = ExternalToolchain::new(
            ToolchainProfile::default(),
            PathBuf::from("/tmp/iso"),
            PathBuf::from("."),
            3,
        );
        let env = toolchain.environment();
        assert!(env.contains(&(OsString::from("GOROOT"), OsString::from("/tmp/iso"))));
        assert!(env.contains(&(OsString::from("GOMAXPROCS"), OsString::from("3"))));
        assert_eq!(
            toolchain.object_path(Path::new("/w/sTestsort-0_0.go")),
            PathBuf::from("/w/sTestsort-0_0.go.6")
        );
    }

    #[cfg(unix)]
    #[test]
    fn missing_linker_is_a_link_stage_error() {
        let dir = tempfile::TempDir::new().expect("tempdir should create");
        let profile = ToolchainProfile {
            compiler: PathBuf::from("true"),
            linker: dir.path().join("no-such-linker"),
            ..ToolchainProfile::default()
        };
        let toolchain = ExternalToolchain::new(
            profile,
            dir.path().join("root"),
            dir.path().to_path_buf(),
            1,
        );
        let source = dir.path().join("p.go");
        std::fs::write(&source, "// x.y\n").expect("source should write");
        let err = build(&toolchain, &source, &dir.path().join("test")).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Launch {
                stage: BuildStage::Link,
                ..
            }
        ));
        assert_eq!(err.outcome(), RunOutcome::LinkFailed);
    }
}
