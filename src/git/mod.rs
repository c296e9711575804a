//! Version-control operations on a project checkout.
//!
//! Mutations shell out to the `git` binary so hooks, credential helpers and
//! the user's config behave exactly as they do on the command line.
//! Read-only inspection goes through libgit2 on the blocking pool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use git2::{BranchType, Repository, StatusOptions};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::branch::select_main_branch;
use crate::errors::GitError;

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether the working tree differs from HEAD, untracked files included.
    async fn has_changes(&self, repo: &Path) -> Result<bool, GitError> {
        Ok(!self.changed_files(repo).await?.is_empty())
    }

    /// Paths (relative to the repo root) that are modified, added, deleted
    /// or untracked.
    async fn changed_files(&self, repo: &Path) -> Result<Vec<String>, GitError>;

    /// Stage everything and commit it.
    async fn commit_all(&self, repo: &Path, message: &str) -> Result<(), GitError>;

    /// Push `branch` to `origin`, setting upstream.
    async fn push(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    async fn pull(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Create `branch` from the current HEAD and switch to it.
    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Force-delete a local branch.
    async fn delete_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Local branch names plus remote-tracking names (`origin/main`).
    async fn list_branches(&self, repo: &Path) -> Result<Vec<String>, GitError>;

    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, GitError> {
        Ok(self.list_branches(repo).await?.iter().any(|b| b == branch))
    }

    /// `main` if present, else `master`, else `main`. Never fails.
    async fn discover_main_branch(&self, repo: &Path) -> String {
        match self.list_branches(repo).await {
            Ok(branches) => select_main_branch(&branches).to_string(),
            Err(e) => {
                warn!(
                    repo = %repo.display(),
                    error = %e,
                    "could not inspect branches, assuming main"
                );
                "main".to_string()
            }
        }
    }
}

/// `VersionControl` backed by the `git` CLI and libgit2.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, repo: &Path, args: &[&str]) -> Result<String, GitError> {
        debug!(repo = %repo.display(), "git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(GitError::Spawn)?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Open the repository on the blocking pool and run `f` against it.
async fn with_repo<T, F>(repo: &Path, f: F) -> Result<T, GitError>
where
    T: Send + 'static,
    F: FnOnce(&Repository) -> Result<T, git2::Error> + Send + 'static,
{
    let path: PathBuf = repo.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&path)?;
        f(&repo).map_err(GitError::from)
    })
    .await
    .map_err(|e| GitError::Join(e.to_string()))?
}

#[async_trait]
impl VersionControl for GitCli {
    async fn changed_files(&self, repo: &Path) -> Result<Vec<String>, GitError> {
        with_repo(repo, |repo| {
            let mut opts = StatusOptions::new();
            opts.include_untracked(true)
                .recurse_untracked_dirs(true)
                .include_ignored(false);
            let statuses = repo.statuses(Some(&mut opts))?;
            Ok(statuses
                .iter()
                .filter(|entry| !entry.status().is_ignored())
                .filter_map(|entry| entry.path().map(str::to_string))
                .collect())
        })
        .await
    }

    async fn commit_all(&self, repo: &Path, message: &str) -> Result<(), GitError> {
        self.run(repo, &["add", "."]).await?;
        self.run(repo, &["commit", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run(repo, &["push", "-u", "origin", branch]).await?;
        Ok(())
    }

    async fn pull(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run(repo, &["pull", "origin", branch]).await?;
        Ok(())
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run(repo, &["checkout", branch]).await?;
        Ok(())
    }

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run(repo, &["checkout", "-b", branch]).await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run(repo, &["branch", "-D", branch]).await?;
        Ok(())
    }

    async fn list_branches(&self, repo: &Path) -> Result<Vec<String>, GitError> {
        with_repo(repo, |repo| {
            let mut names = Vec::new();
            for branch in repo.branches(None)? {
                let (branch, kind) = branch?;
                if let Some(name) = branch.name()? {
                    // The symbolic origin/HEAD is not a branch anyone checks out.
                    if kind == BranchType::Remote && name.ends_with("/HEAD") {
                        continue;
                    }
                    names.push(name.to_string());
                }
            }
            Ok(names)
        })
        .await
    }

    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, GitError> {
        let branch = branch.to_string();
        with_repo(repo, move |repo| {
            match repo.find_branch(&branch, BranchType::Local) {
                Ok(_) => Ok(true),
                Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }
}
