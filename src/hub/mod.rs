//! Build farm hub client.
//!
//! The hub exposes an RPC surface for target/tag introspection, task
//! introspection, and build submission. `HubClient` is the exact capability
//! set this crate consumes; the real `HubSession` speaks a JSON envelope
//! over HTTPS with client-certificate auth, and tests substitute the
//! in-memory hub from `crate::mock`.

mod session;

pub use session::HubSession;

use serde::{Deserialize, Serialize};

/// Identifier of a task on the hub.
pub type TaskId = u64;

/// A named build target: where builds submit to and where results land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    pub id: u32,
    pub name: String,
    pub build_tag: u32,
    pub build_tag_name: String,
    pub dest_tag: u32,
    pub dest_tag_name: String,
}

/// A package tag. Locked tags reject non-scratch output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: u32,
    pub name: String,
    pub locked: bool,
}

/// One link in a build tag's ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceEntry {
    pub parent_id: u32,
    pub name: String,
    pub priority: i32,
}

/// Task states as reported by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Free,
    Open,
    Closed,
    Canceled,
    Assigned,
    Failed,
}

impl TaskState {
    /// Terminal states are never re-observed as non-terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Closed | TaskState::Canceled | TaskState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Free => "FREE",
            TaskState::Open => "OPEN",
            TaskState::Closed => "CLOSED",
            TaskState::Canceled => "CANCELED",
            TaskState::Assigned => "ASSIGNED",
            TaskState::Failed => "FAILED",
        }
    }
}

/// A snapshot of one task, as the hub reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub parent: Option<TaskId>,
    pub state: TaskState,
    pub method: String,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub host_id: Option<u32>,
}

impl TaskInfo {
    /// Short human label, e.g. `build (noarch)`.
    pub fn label(&self) -> String {
        match &self.arch {
            Some(arch) => format!("{} ({arch})", self.method),
            None => self.method.clone(),
        }
    }
}

/// Options attached to a build request. Immutable once submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Skip the tag step after a successful build.
    pub skip_tag: bool,
    /// Scratch output is never tagged, so lock checks do not apply.
    pub scratch: bool,
    /// Ask the hub for a lower scheduling priority.
    pub background: bool,
}

/// Priority the hub assigns background builds.
const BACKGROUND_PRIORITY: i32 = 5;

impl BuildOptions {
    pub fn priority(&self) -> Option<i32> {
        self.background.then_some(BACKGROUND_PRIORITY)
    }
}

/// Errors from hub calls.
///
/// `Auth` and `Transport` are faults of the session itself; `Protocol` means
/// the hub answered but not in the shape we expect. Expected "not found"
/// outcomes are `Ok(None)` on the lookup calls, so callers can map them to
/// their own validation errors.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("hub transport error: {0}")]
    Transport(String),

    #[error("hub protocol error: {0}")]
    Protocol(String),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
}

/// The hub operations this crate consumes.
pub trait HubClient {
    fn get_build_target(&self, name: &str) -> Result<Option<BuildTarget>, HubError>;

    fn get_tag(&self, name: &str) -> Result<Option<TagInfo>, HubError>;

    /// Full ancestor chain of a build tag.
    fn get_full_inheritance(&self, tag_id: u32) -> Result<Vec<InheritanceEntry>, HubError>;

    fn get_task_info(&self, id: TaskId) -> Result<TaskInfo, HubError>;

    fn get_task_children(&self, id: TaskId) -> Result<Vec<TaskInfo>, HubError>;

    /// Submit a single build. Returns the task id immediately.
    fn build(
        &self,
        source: &str,
        target: &str,
        opts: &BuildOptions,
    ) -> Result<TaskId, HubError>;

    /// Submit a chain build: groups run in sequence, members of a group in
    /// parallel.
    fn chain_build(
        &self,
        groups: &[Vec<String>],
        target: &str,
        opts: &BuildOptions,
    ) -> Result<TaskId, HubError>;
}

/// Web URL for a task, for operator-facing output.
pub fn task_url(web_url: &str, id: TaskId) -> String {
    format!("{web_url}/taskinfo?taskID={id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskState::Closed.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Free.is_terminal());
        assert!(!TaskState::Open.is_terminal());
        assert!(!TaskState::Assigned.is_terminal());
    }

    #[test]
    fn background_maps_to_low_priority() {
        let opts = BuildOptions {
            background: true,
            ..Default::default()
        };
        assert_eq!(opts.priority(), Some(5));
        assert_eq!(BuildOptions::default().priority(), None);
    }

    #[test]
    fn task_state_wire_names() {
        let state: TaskState = serde_json::from_str("\"CLOSED\"").unwrap();
        assert_eq!(state, TaskState::Closed);
        assert_eq!(serde_json::to_string(&TaskState::Free).unwrap(), "\"FREE\"");
    }

    #[test]
    fn label_includes_arch_when_present() {
        let info = TaskInfo {
            id: 1,
            parent: None,
            state: TaskState::Open,
            method: "build".to_string(),
            arch: Some("noarch".to_string()),
            host_id: None,
        };
        assert_eq!(info.label(), "build (noarch)");
    }
}
