use std::error::Error;
use std::fmt;
use std::path::Path;
use std::process::{Command, Output};

use tracing::debug;

use crate::domain::metadata::GitContext;

/// Read-only view of the repository enclosing a storage root.
#[derive(Debug, Clone, Default)]
pub struct GitAdapter;

/// HEAD as recorded by the commit tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadCommit {
    pub hash: String,
    pub subject: String,
    pub branch: String,
}

impl GitAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn is_repository(&self, cwd: &Path) -> bool {
        self.run_allow_failure(
            cwd,
            vec!["rev-parse".to_string(), "--is-inside-work-tree".to_string()],
        )
        .map(|output| {
            output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true"
        })
        .unwrap_or(false)
    }

    pub fn current_branch(&self, cwd: &Path) -> Result<String, GitError> {
        self.run_checked(
            cwd,
            vec![
                "rev-parse".to_string(),
                "--abbrev-ref".to_string(),
                "HEAD".to_string(),
            ],
        )
    }

    pub fn head_commit(&self, cwd: &Path) -> Result<String, GitError> {
        self.run_checked(cwd, vec!["rev-parse".to_string(), "HEAD".to_string()])
    }

    pub fn head_subject(&self, cwd: &Path) -> Result<String, GitError> {
        self.run_checked(
            cwd,
            vec![
                "log".to_string(),
                "-1".to_string(),
                "--format=%s".to_string(),
            ],
        )
    }

    pub fn is_dirty(&self, cwd: &Path) -> Result<bool, GitError> {
        let output =
            self.run_checked(cwd, vec!["status".to_string(), "--porcelain".to_string()])?;
        Ok(!output.trim().is_empty())
    }

    pub fn head(&self, cwd: &Path) -> Result<HeadCommit, GitError> {
        Ok(HeadCommit {
            hash: self.head_commit(cwd)?,
            subject: self.head_subject(cwd)?,
            branch: self.current_branch(cwd)?,
        })
    }

    /// Best effort: `None` outside a repository, without git, or before the
    /// first commit.
    pub fn capture_context(&self, cwd: &Path) -> Option<GitContext> {
        if !self.is_repository(cwd) {
            return None;
        }
        let context = (|| -> Result<GitContext, GitError> {
            Ok(GitContext {
                branch: self.current_branch(cwd)?,
                commit: short_hash(&self.head_commit(cwd)?).to_string(),
                dirty: self.is_dirty(cwd)?,
            })
        })();
        match context {
            Ok(context) => Some(context),
            Err(err) => {
                debug!(root = %cwd.display(), error = %err, "git context unavailable");
                None
            }
        }
    }

    fn run_checked(&self, cwd: &Path, args: Vec<String>) -> Result<String, GitError> {
        let output = self.run_allow_failure(cwd, args.clone())?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::CommandFailed {
                command: display_command(cwd, &args),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_allow_failure(&self, cwd: &Path, args: Vec<String>) -> Result<Output, GitError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(cwd).args(&args);
        cmd.output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                GitError::Unavailable
            } else {
                GitError::Io(err)
            }
        })
    }
}

pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn display_command(cwd: &Path, args: &[String]) -> String {
    format!("git -C {} {}", cwd.display(), args.join(" "))
}

#[derive(Debug)]
pub enum GitError {
    Io(std::io::Error),
    Unavailable,
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitError::Io(err) => write!(f, "I/O error while running git: {}", err),
            GitError::Unavailable => write!(f, "git executable not found in PATH"),
            GitError::CommandFailed {
                command,
                code,
                stderr,
            } => write!(
                f,
                "git command failed ({}) with code {:?}: {}",
                command, code, stderr
            ),
        }
    }
}

impl Error for GitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GitError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GitError {
    fn from(value: std::io::Error) -> Self {
        GitError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{short_hash, GitAdapter};
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use uuid::Uuid;

    fn unique_workspace() -> PathBuf {
        let root = std::env::temp_dir().join(format!("worktrail-git-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("temp workspace should be creatable");
        root
    }

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn git(root: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(root)
            .args(args)
            .status()
            .expect("git should run");
        assert!(status.success(), "git {:?} should succeed", args);
    }

    #[test]
    fn short_hash_truncates_long_hashes_only() {
        assert_eq!(short_hash("0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn capture_context_is_none_outside_a_repository() {
        let root = unique_workspace();
        if git_available() && !GitAdapter::new().is_repository(&root) {
            assert!(GitAdapter::new().capture_context(&root).is_none());
        }
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn capture_context_reads_branch_commit_and_dirtiness() {
        if !git_available() {
            return;
        }
        let root = unique_workspace();
        git(&root, &["init", "-q", "-b", "main"]);
        git(&root, &["config", "user.email", "dev@example.com"]);
        git(&root, &["config", "user.name", "Dev"]);
        std::fs::write(root.join("README.md"), "hello\n").expect("write readme");
        git(&root, &["add", "README.md"]);
        git(&root, &["commit", "-q", "--no-gpg-sign", "-m", "initial import"]);

        let adapter = GitAdapter::new();
        let context = adapter
            .capture_context(&root)
            .expect("context should be captured");
        assert_eq!(context.branch, "main");
        assert_eq!(context.commit.len(), 12);
        assert!(!context.dirty);

        let head = adapter.head(&root).expect("head should resolve");
        assert_eq!(head.subject, "initial import");
        assert!(head.hash.starts_with(&context.commit));

        std::fs::write(root.join("scratch.txt"), "wip\n").expect("write scratch");
        let dirty = adapter
            .capture_context(&root)
            .expect("context should be captured");
        assert!(dirty.dirty);

        let _ = std::fs::remove_dir_all(root);
    }
}
