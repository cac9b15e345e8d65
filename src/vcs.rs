//! Local checkout state and the anonymous VCS remote.
//!
//! The build farm builds from `<anongit>/<module>?#<commit>` references, so
//! the client never uploads tree content for a regular build; it only needs
//! to prove the commit is published. The `Vcs` trait is the narrow seam the
//! submitter and chain builder depend on, substitutable by a fake in tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Errors from VCS queries and checkout inspection.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("could not run git: {0}")]
    Io(#[from] io::Error),

    #[error("`{cmd}` failed: {stderr}")]
    GitFailed { cmd: String, stderr: String },

    #[error("no spec file found in {}", .0.display())]
    NoSpecFile(PathBuf),

    #[error("unknown branch: {0}")]
    UnknownBranch(String),

    #[error("no commit found for ref {refname} of {module}")]
    RefNotFound { module: String, refname: String },
}

/// VCS operations the submission path depends on.
pub trait Vcs {
    /// Uncommitted changes present in the working tree?
    fn is_dirty(&self) -> Result<bool, VcsError>;

    /// Name of the currently checked-out branch.
    fn active_branch(&self) -> Result<String, VcsError>;

    /// Local commits not present on the remote-tracking branch?
    fn has_unpushed(&self, branch: &str) -> Result<bool, VcsError>;

    /// Commit id of the local HEAD.
    fn head_commit(&self) -> Result<String, VcsError>;

    /// Latest commit id of `refname` for a module, read from the remote.
    fn latest_commit(&self, module: &str, refname: &str) -> Result<String, VcsError>;
}

/// `Vcs` implementation shelling out to the `git` binary.
pub struct GitCli {
    path: PathBuf,
    anongit_url: String,
}

impl GitCli {
    pub fn new(path: &Path, anongit_url: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            anongit_url: anongit_url.to_string(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()?;
        if !output.status.success() {
            return Err(VcsError::GitFailed {
                cmd: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Vcs for GitCli {
    fn is_dirty(&self) -> Result<bool, VcsError> {
        let status = self.git(&["status", "--porcelain"])?;
        Ok(!status.trim().is_empty())
    }

    fn active_branch(&self) -> Result<String, VcsError> {
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(branch.trim().to_string())
    }

    fn has_unpushed(&self, branch: &str) -> Result<bool, VcsError> {
        // Commits on either side of HEAD...origin/<branch> mean the local
        // selection is not what the remote has.
        let range = format!("HEAD...origin/{branch}");
        let revs = self.git(&["rev-list", &range])?;
        Ok(!revs.trim().is_empty())
    }

    fn head_commit(&self) -> Result<String, VcsError> {
        let commit = self.git(&["rev-parse", "HEAD"])?;
        Ok(commit.trim().to_string())
    }

    fn latest_commit(&self, module: &str, refname: &str) -> Result<String, VcsError> {
        let url = format!("{}/{}", self.anongit_url, module);
        let output = Command::new("git")
            .args(["ls-remote", &url, refname])
            .output()?;
        if !output.status.success() {
            return Err(VcsError::GitFailed {
                cmd: format!("git ls-remote {url} {refname}"),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.split_whitespace().next() {
            Some(commit) => Ok(commit.to_string()),
            None => Err(VcsError::RefNotFound {
                module: module.to_string(),
                refname: refname.to_string(),
            }),
        }
    }
}

/// Build the source reference the hub understands.
pub fn source_url(anongit_url: &str, module: &str, commit: &str) -> String {
    format!("{anongit_url}/{module}?#{commit}")
}

/// Find the module name from the spec file in a checkout.
pub fn module_name(path: &Path) -> Result<String, VcsError> {
    let mut names: Vec<String> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.strip_suffix(".spec").map(str::to_string))
        .collect();
    names.sort();
    names
        .into_iter()
        .next()
        .ok_or_else(|| VcsError::NoSpecFile(path.to_path_buf()))
}

/// What the branch marker file implies for this checkout: the build target
/// to submit to and the dist suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchProfile {
    pub branch: String,
    pub target: String,
    pub dist: String,
}

impl BranchProfile {
    /// Read the `branch` marker file in a checkout; a missing marker means
    /// the development branch.
    pub fn detect(path: &Path) -> Result<Self, VcsError> {
        let marker = path.join("branch");
        let branch = if marker.exists() {
            fs::read_to_string(&marker)?.trim().to_string()
        } else {
            "devel".to_string()
        };
        Self::from_branch(&branch)
    }

    pub fn from_branch(branch: &str) -> Result<Self, VcsError> {
        let (target, dist) = if let Some(n) = branch.strip_prefix("F-") {
            (format!("dist-f{n}-updates-candidate"), format!(".fc{n}"))
        } else if let Some(n) = branch.strip_prefix("EL-") {
            (format!("dist-{n}E-epel-testing-candidate"), format!(".el{n}"))
        } else if let Some(n) = branch.strip_prefix("OLPC-") {
            (format!("dist-olpc{n}"), format!(".olpc{n}"))
        } else if branch == "devel" {
            // TODO: map devel to a real rawhide target once the hub grows one
            ("dist-f14".to_string(), ".fc14".to_string())
        } else {
            return Err(VcsError::UnknownBranch(branch.to_string()));
        };
        Ok(Self {
            branch: branch.to_string(),
            target,
            dist,
        })
    }
}
