//! In-process test doubles for the external collaborators.
//!
//! `MockHub`, `MemoryCacheTransport` and `FakeVcs` implement the narrow
//! interfaces the real client consumes, so submission, watching and cache
//! logic can be exercised without a network or a git checkout.

mod cache;
mod hub;
mod vcs;

pub use cache::MemoryCacheTransport;
pub use hub::{MockHub, Submission};
pub use vcs::FakeVcs;
