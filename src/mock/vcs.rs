//! Scriptable VCS double.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::vcs::{Vcs, VcsError};

pub struct FakeVcs {
    dirty: bool,
    unpushed: bool,
    branch: String,
    head: String,
    remote_heads: Mutex<HashMap<String, String>>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeVcs {
    pub fn new() -> Self {
        Self {
            dirty: false,
            unpushed: false,
            branch: "F-13".to_string(),
            head: "cafe0001".to_string(),
            remote_heads: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    pub fn with_unpushed(mut self, unpushed: bool) -> Self {
        self.unpushed = unpushed;
        self
    }

    pub fn with_head(mut self, head: &str) -> Self {
        self.head = head.to_string();
        self
    }

    /// Publish a remote head for a module, resolvable by `latest_commit`.
    pub fn set_remote_head(&self, module: &str, commit: &str) {
        if let Ok(mut heads) = self.remote_heads.lock() {
            heads.insert(module.to_string(), commit.to_string());
        }
    }
}

impl Vcs for FakeVcs {
    fn is_dirty(&self) -> Result<bool, VcsError> {
        Ok(self.dirty)
    }

    fn active_branch(&self) -> Result<String, VcsError> {
        Ok(self.branch.clone())
    }

    fn has_unpushed(&self, _branch: &str) -> Result<bool, VcsError> {
        Ok(self.unpushed)
    }

    fn head_commit(&self) -> Result<String, VcsError> {
        Ok(self.head.clone())
    }

    fn latest_commit(&self, module: &str, refname: &str) -> Result<String, VcsError> {
        self.remote_heads
            .lock()
            .ok()
            .and_then(|heads| heads.get(module).cloned())
            .ok_or_else(|| VcsError::RefNotFound {
                module: module.to_string(),
                refname: refname.to_string(),
            })
    }
}
