//! Configurable in-memory hub.
//!
//! Tasks carry a scripted sequence of states; every `get_task_info` call
//! advances the script by one step, so a test controls exactly what each
//! polling pass observes.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::hub::{
    BuildOptions, BuildTarget, HubClient, HubError, InheritanceEntry, TagInfo, TaskId, TaskInfo,
    TaskState,
};

/// A submission recorded by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Build {
        source: String,
        target: String,
        opts: BuildOptions,
    },
    ChainBuild {
        groups: Vec<Vec<String>>,
        target: String,
        opts: BuildOptions,
    },
}

struct ScriptedTask {
    info: TaskInfo,
    script: VecDeque<TaskState>,
}

#[derive(Default)]
struct HubState {
    targets: HashMap<String, BuildTarget>,
    tags: HashMap<String, TagInfo>,
    inheritance: HashMap<u32, Vec<InheritanceEntry>>,
    tasks: HashMap<TaskId, ScriptedTask>,
    children: HashMap<TaskId, Vec<TaskId>>,
    submissions: Vec<Submission>,
    next_script: Option<Vec<TaskState>>,
    next_task_id: TaskId,
    info_queries: HashMap<TaskId, u32>,
}

pub struct MockHub {
    state: Mutex<HubState>,
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                next_task_id: 1000,
                ..HubState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_target(&self, target: BuildTarget) {
        let mut state = self.lock();
        state.targets.insert(target.name.clone(), target);
    }

    pub fn add_tag(&self, tag: TagInfo) {
        let mut state = self.lock();
        state.tags.insert(tag.name.clone(), tag);
    }

    pub fn set_inheritance(&self, build_tag: u32, entries: Vec<InheritanceEntry>) {
        self.lock().inheritance.insert(build_tag, entries);
    }

    /// Script the task created by the next build submission. States are
    /// consumed one per info query; the last one sticks.
    pub fn script_next_build(&self, states: Vec<TaskState>) {
        self.lock().next_script = Some(states);
    }

    /// Register a task directly, for watch tests.
    pub fn insert_task(&self, info: TaskInfo, script: Vec<TaskState>) {
        let mut state = self.lock();
        state.tasks.insert(
            info.id,
            ScriptedTask {
                info,
                script: script.into(),
            },
        );
    }

    /// Register a child; it becomes visible through `get_task_children`.
    pub fn add_child(&self, parent: TaskId, info: TaskInfo, script: Vec<TaskState>) {
        let mut state = self.lock();
        state.children.entry(parent).or_default().push(info.id);
        state.tasks.insert(
            info.id,
            ScriptedTask {
                info,
                script: script.into(),
            },
        );
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    /// How many times a task's info has been queried.
    pub fn info_query_count(&self, id: TaskId) -> u32 {
        self.lock().info_queries.get(&id).copied().unwrap_or(0)
    }

    fn submit(&self, submission: Submission) -> TaskId {
        let mut state = self.lock();
        let id = state.next_task_id;
        state.next_task_id += 1;
        let script = state
            .next_script
            .take()
            .unwrap_or_else(|| vec![TaskState::Open, TaskState::Closed]);
        state.tasks.insert(
            id,
            ScriptedTask {
                info: TaskInfo {
                    id,
                    parent: None,
                    state: TaskState::Free,
                    method: "build".to_string(),
                    arch: None,
                    host_id: None,
                },
                script: script.into(),
            },
        );
        state.submissions.push(submission);
        id
    }
}

impl HubClient for MockHub {
    fn get_build_target(&self, name: &str) -> Result<Option<BuildTarget>, HubError> {
        Ok(self.lock().targets.get(name).cloned())
    }

    fn get_tag(&self, name: &str) -> Result<Option<TagInfo>, HubError> {
        Ok(self.lock().tags.get(name).cloned())
    }

    fn get_full_inheritance(&self, tag_id: u32) -> Result<Vec<InheritanceEntry>, HubError> {
        Ok(self.lock().inheritance.get(&tag_id).cloned().unwrap_or_default())
    }

    fn get_task_info(&self, id: TaskId) -> Result<TaskInfo, HubError> {
        let mut state = self.lock();
        *state.info_queries.entry(id).or_insert(0) += 1;
        let task = state.tasks.get_mut(&id).ok_or(HubError::UnknownTask(id))?;
        if let Some(next) = task.script.pop_front() {
            task.info.state = next;
        }
        Ok(task.info.clone())
    }

    fn get_task_children(&self, id: TaskId) -> Result<Vec<TaskInfo>, HubError> {
        let state = self.lock();
        let ids = state.children.get(&id).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|child| state.tasks.get(child).map(|t| t.info.clone()))
            .collect())
    }

    fn build(
        &self,
        source: &str,
        target: &str,
        opts: &BuildOptions,
    ) -> Result<TaskId, HubError> {
        Ok(self.submit(Submission::Build {
            source: source.to_string(),
            target: target.to_string(),
            opts: *opts,
        }))
    }

    fn chain_build(
        &self,
        groups: &[Vec<String>],
        target: &str,
        opts: &BuildOptions,
    ) -> Result<TaskId, HubError> {
        Ok(self.submit(Submission::ChainBuild {
            groups: groups.to_vec(),
            target: target.to_string(),
            opts: *opts,
        }))
    }
}
