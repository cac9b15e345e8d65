//! forgepkg - build farm and lookaside cache client for package
//! maintainers.
//!
//! The crate submits builds (single or chained) to a remote build hub,
//! watches their tasks until completion, and keeps large source blobs in a
//! content-addressed lookaside cache instead of the code repository.

pub mod chain;
pub mod checksum;
pub mod config;
pub mod hub;
pub mod lookaside;
pub mod mock;
pub mod report;
pub mod submit;
pub mod vcs;
pub mod watch;

pub use config::ClientConfig;
pub use hub::{BuildOptions, HubClient, HubSession, TaskId, TaskState};
pub use lookaside::{LookasideCache, SourcesManifest};
pub use report::Reporter;
pub use submit::BuildSubmitter;
pub use vcs::{BranchProfile, GitCli};
pub use watch::TaskRegistry;
