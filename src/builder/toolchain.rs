//! Toolchain abstraction and the command-line compiler implementation.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Placeholder replaced with the source path in toolchain arguments
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Placeholder replaced with the artifact path in toolchain arguments
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// What a toolchain invocation reported
#[derive(Debug, Clone)]
pub struct ToolchainOutput {
    /// Whether the toolchain exited with status zero
    pub success: bool,
    /// Exit code, if the toolchain exited normally
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// External translator from source file to executable
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Translate `source` into an executable at `artifact`.
    ///
    /// Implementations must kill their child process if the returned future
    /// is dropped, since the builder enforces its timeout by dropping it.
    async fn compile(&self, source: &Path, artifact: &Path) -> std::io::Result<ToolchainOutput>;
}

/// Toolchain that runs a fixed command with `{source}`/`{artifact}` placeholders
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    name: String,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandToolchain {
    /// Create a new command toolchain
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments before placeholder substitution
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Arguments with placeholders substituted
    pub fn resolved_args(&self, source: &Path, artifact: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let artifact = artifact.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(SOURCE_PLACEHOLDER, &source)
                    .replace(ARTIFACT_PLACEHOLDER, &artifact)
            })
            .collect()
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compile(&self, source: &Path, artifact: &Path) -> std::io::Result<ToolchainOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.resolved_args(source, artifact));
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await?;
        Ok(ToolchainOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Common toolchains
pub mod presets {
    use super::*;

    /// g++ with the standard judge flags
    pub fn gpp() -> CommandToolchain {
        CommandToolchain::new(
            "g++",
            "g++",
            vec![
                "-o".to_string(),
                ARTIFACT_PLACEHOLDER.to_string(),
                SOURCE_PLACEHOLDER.to_string(),
                "-std=c++17".to_string(),
                "-O2".to_string(),
            ],
        )
    }

    /// POSIX shell scripts: syntax-check with `sh -n`, then install as executable
    pub fn shell_script() -> CommandToolchain {
        CommandToolchain::new(
            "sh",
            "sh",
            vec![
                "-c".to_string(),
                r#"sh -n "$0" && cp "$0" "$1" && chmod +x "$1""#.to_string(),
                SOURCE_PLACEHOLDER.to_string(),
                ARTIFACT_PLACEHOLDER.to_string(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_gpp_resolved_args() {
        let toolchain = presets::gpp();
        let args = toolchain.resolved_args(&PathBuf::from("/w/a.cpp"), &PathBuf::from("/w/a"));
        assert_eq!(args, vec!["-o", "/w/a", "/w/a.cpp", "-std=c++17", "-O2"]);
        assert_eq!(toolchain.program(), "g++");
        assert_eq!(toolchain.name(), "g++");
    }

    #[test]
    fn test_placeholder_inside_argument() {
        let toolchain =
            CommandToolchain::new("custom", "cc", vec!["--out={artifact}".to_string()]);
        let args = toolchain.resolved_args(Path::new("s.c"), Path::new("bin/s"));
        assert_eq!(args, vec!["--out=bin/s"]);
    }

    #[tokio::test]
    async fn test_shell_script_toolchain_installs_executable() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("prog.sh");
        let artifact = dir.path().join("prog");
        std::fs::write(&source, "#!/bin/sh\necho hi\n").unwrap();

        let output = presets::shell_script()
            .compile(&source, &artifact)
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.exit_code, Some(0));
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn test_shell_script_toolchain_rejects_syntax_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("bad.sh");
        let artifact = dir.path().join("bad");
        std::fs::write(&source, "#!/bin/sh\nif then fi (\n").unwrap();

        let output = presets::shell_script()
            .compile(&source, &artifact)
            .await
            .unwrap();
        assert!(!output.success);
        assert!(!output.stderr.is_empty());
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let toolchain = CommandToolchain::new("ghost", "nonexistent_compiler_xyz123", vec![]);
        let result = toolchain
            .compile(Path::new("a.cpp"), Path::new("a"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("out");
        let toolchain = CommandToolchain::new(
            "env",
            "sh",
            vec![
                "-c".to_string(),
                r#"test "$FLAVOR" = "strict" && touch "$0""#.to_string(),
                ARTIFACT_PLACEHOLDER.to_string(),
            ],
        )
        .env("FLAVOR", "strict");

        let output = toolchain.compile(Path::new("unused"), &artifact).await.unwrap();
        assert!(output.success);
        assert!(artifact.exists());
    }
}
