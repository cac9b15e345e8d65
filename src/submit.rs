//! Build submission.
//!
//! Validates local checkout state and remote target/tag state, then issues
//! exactly one build request (single or chain) and returns the task id.
//! Every validation runs before anything is submitted, so a failed check
//! never leaves a partial request outstanding on the hub. Waiting on the
//! task is the watcher's job, never this module's.

use crate::chain::{self, ChainError};
use crate::hub::{BuildOptions, HubClient, HubError, TaskId};
use crate::vcs::{source_url, BranchProfile, Vcs, VcsError};

/// Errors from build submission.
///
/// The first six are expected validation outcomes; the wrapped variants
/// carry faults from the collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("there are uncommitted changes in your checkout")]
    UncommittedChanges,

    #[error("there are unpushed changes in your checkout")]
    UnpushedChanges,

    #[error("unknown build target: {0}")]
    UnknownTarget(String),

    #[error("unknown destination tag: {0}")]
    UnknownTag(String),

    #[error("destination tag {0} is locked")]
    LockedTag(String),

    #[error("destination tag {dest} is not inherited by build tag {build}")]
    Inheritance { dest: String, build: String },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Separator token between chain build groups on the command line.
pub const GROUP_SEPARATOR: &str = ":";

pub struct BuildSubmitter<'a> {
    hub: &'a dyn HubClient,
    vcs: &'a dyn Vcs,
    profile: &'a BranchProfile,
    module: &'a str,
    anongit_url: &'a str,
}

impl<'a> BuildSubmitter<'a> {
    pub fn new(
        hub: &'a dyn HubClient,
        vcs: &'a dyn Vcs,
        profile: &'a BranchProfile,
        module: &'a str,
        anongit_url: &'a str,
    ) -> Self {
        Self {
            hub,
            vcs,
            profile,
            module,
            anongit_url,
        }
    }

    /// Submit a build and return its task id without waiting on it.
    ///
    /// `explicit_source` skips the local tree checks (the artifact is
    /// already uploaded somewhere the hub can reach); `chain` is the raw
    /// ordered token list from the command line.
    pub fn submit(
        &self,
        opts: &BuildOptions,
        explicit_source: Option<&str>,
        chain: Option<&[String]>,
    ) -> Result<TaskId, SubmitError> {
        // Pure validation first: a self-referencing chain is a usage error
        // we can reject before touching git or the network.
        let groups = chain
            .map(|tokens| chain::build_groups(tokens, GROUP_SEPARATOR, self.module))
            .transpose()?;

        let source = match explicit_source {
            Some(url) => url.to_string(),
            None => self.local_source()?,
        };

        let target = self
            .hub
            .get_build_target(&self.profile.target)?
            .ok_or_else(|| SubmitError::UnknownTarget(self.profile.target.clone()))?;
        let dest_tag = self
            .hub
            .get_tag(&target.dest_tag_name)?
            .ok_or_else(|| SubmitError::UnknownTag(target.dest_tag_name.clone()))?;
        if dest_tag.locked && !opts.scratch {
            return Err(SubmitError::LockedTag(dest_tag.name));
        }

        match groups {
            Some(groups) => {
                // Intermediate chain results must be visible from the build
                // tag, or later groups could never build against them.
                let ancestors = self.hub.get_full_inheritance(target.build_tag)?;
                let visible = dest_tag.id == target.build_tag
                    || ancestors.iter().any(|a| a.parent_id == dest_tag.id);
                if !visible {
                    return Err(SubmitError::Inheritance {
                        dest: target.dest_tag_name.clone(),
                        build: target.build_tag_name.clone(),
                    });
                }
                let refs = chain::resolve_groups(
                    &groups,
                    self.module,
                    &source,
                    self.vcs,
                    self.anongit_url,
                )?;
                Ok(self.hub.chain_build(&refs, &target.name, opts)?)
            }
            None => Ok(self.hub.build(&source, &target.name, opts)?),
        }
    }

    /// Derive the source reference from the local checkout.
    ///
    /// The tree must be clean and the selected commit already published on
    /// the remote-tracking branch, since the build farm clones from the
    /// anonymous remote and would otherwise build something else than what
    /// the packager is looking at.
    fn local_source(&self) -> Result<String, SubmitError> {
        if self.vcs.is_dirty()? {
            return Err(SubmitError::UncommittedChanges);
        }
        let branch = self.vcs.active_branch()?;
        if self.vcs.has_unpushed(&branch)? {
            return Err(SubmitError::UnpushedChanges);
        }
        let commit = self.vcs.head_commit()?;
        Ok(source_url(self.anongit_url, self.module, &commit))
    }
}
