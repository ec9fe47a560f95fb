use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Unable to run `{command}`: {message}")]
    Unavailable { command: String, message: String },

    #[error("Command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },
}

/// Provenance of the working copy the stacks are defined from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitInfo {
    pub tag: String,
    pub branch: String,
    pub commit: String,
}

/// Source of version-control provenance.
pub trait VersionControl {
    fn describe_repo(&self) -> Result<GitInfo, Error>;
}

/// Reads provenance by running the local `git` binary.
#[derive(Debug, Default, Clone)]
pub struct GitCli {
    workdir: Option<PathBuf>,
    pinned: bool,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run git from `workdir` instead of the process working directory.
    pub fn in_dir(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(workdir.into()),
            pinned: false,
        }
    }

    /// Only consider a repository rooted exactly at `root`: git does not
    /// search parent directories and ignores `GIT_DIR` / `GIT_WORK_TREE`.
    pub fn repository_root(root: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(root.into()),
            pinned: true,
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, Error> {
        let command_line = format!("git {}", args.join(" "));

        let mut command = Command::new("git");
        command.args(args);
        if let Some(workdir) = &self.workdir {
            command.current_dir(workdir);
            if self.pinned {
                let ceiling = workdir.parent().unwrap_or(workdir);
                command
                    .env("GIT_CEILING_DIRECTORIES", ceiling)
                    .env_remove("GIT_DIR")
                    .env_remove("GIT_WORK_TREE");
            }
        }

        let output = command.output().map_err(|error| Error::Unavailable {
            command: command_line.clone(),
            message: error.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let output = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(Error::CommandFailed {
                command: command_line,
                output,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VersionControl for GitCli {
    fn describe_repo(&self) -> Result<GitInfo, Error> {
        let tag = self.run(&["describe", "--tags", "--abbrev=0"])?;
        let branch = self.run(&["branch", "--show-current"])?;
        let commit = self.run(&["rev-parse", "--short", "HEAD"])?;

        tracing::debug!(%tag, %branch, %commit, "Captured git provenance");

        Ok(GitInfo {
            tag,
            branch,
            commit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, GitCli, VersionControl};
    use tempfile::tempdir;

    #[test]
    fn fails_outside_a_repository() {
        let dir = tempdir().unwrap();

        let result = GitCli::repository_root(dir.path()).describe_repo();

        match result {
            Err(Error::CommandFailed { command, .. }) => {
                assert_eq!(command, "git describe --tags --abbrev=0")
            }
            // No git binary on the machine running the tests
            Err(Error::Unavailable { .. }) => {}
            Ok(info) => panic!("Expected an error, got {:?}", info),
        }
    }
}
