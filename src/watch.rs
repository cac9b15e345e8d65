//! Task watching.
//!
//! The registry owns the only blocking loop in the client. Each pass polls
//! every tracked, non-terminal task, logs state transitions, and when a
//! task completes asks for its children one last time — tasks may spawn
//! children right up to completion. Newly discovered children are collected
//! in a pending queue and merged after the pass, so the task map is never
//! mutated while it is being walked, and the loop cannot exit before every
//! new child has been observed at least once.
//!
//! An interrupt stops watching without cancelling anything remote:
//! submission and monitoring are deliberately decoupled, and the operator
//! can resume later by task id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::hub::{task_url, HubClient, HubError, TaskId, TaskInfo, TaskState};
use crate::report::Reporter;

/// Tracks one task across polling passes.
#[derive(Debug)]
pub struct TaskWatcher {
    pub id: TaskId,
    /// Nesting depth: 0 for roots, parent level + 1 for children.
    pub level: usize,
    info: Option<TaskInfo>,
}

impl TaskWatcher {
    pub fn new(id: TaskId, level: usize) -> Self {
        Self {
            id,
            level,
            info: None,
        }
    }

    /// Record a fresh observation. Returns true exactly when the observed
    /// state differs from the last one (including the first observation).
    pub fn update(&mut self, info: TaskInfo) -> bool {
        let changed = self.state() != Some(info.state);
        self.info = Some(info);
        changed
    }

    pub fn state(&self) -> Option<TaskState> {
        self.info.as_ref().map(|i| i.state)
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_some_and(|s| s.is_terminal())
    }

    fn label(&self) -> String {
        match &self.info {
            Some(info) => info.label(),
            None => "task".to_string(),
        }
    }

    fn transition_line(&self) -> String {
        let state = self.state().map(TaskState::as_str).unwrap_or("UNKNOWN");
        format!(
            "{:indent$}{} {}: {}",
            "",
            self.id,
            self.label(),
            state,
            indent = self.level * 2
        )
    }
}

/// Outcome of one polling pass.
struct PassOutcome {
    all_done: bool,
}

/// Registry of tracked tasks, polled until all are terminal.
pub struct TaskRegistry<'a> {
    hub: &'a dyn HubClient,
    reporter: &'a Reporter,
    web_url: String,
    poll_interval: Duration,
    interrupted: Arc<AtomicBool>,
    tasks: HashMap<TaskId, TaskWatcher>,
    roots: Vec<TaskId>,
}

impl<'a> TaskRegistry<'a> {
    pub fn new(
        hub: &'a dyn HubClient,
        reporter: &'a Reporter,
        web_url: &str,
        poll_interval: Duration,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            hub,
            reporter,
            web_url: web_url.to_string(),
            poll_interval,
            interrupted,
            tasks: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Poll until every tracked task is terminal, or an interrupt arrives.
    ///
    /// The exit code is 0 only when every root task closed successfully.
    /// Non-root outcomes are reported for visibility but only the roots are
    /// authoritative for the requester, mirroring the hub's own semantics.
    pub fn poll_until_done(&mut self, root_ids: &[TaskId]) -> Result<i32, HubError> {
        self.roots = root_ids.to_vec();
        for &id in root_ids {
            self.tasks.entry(id).or_insert_with(|| TaskWatcher::new(id, 0));
        }

        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                self.report_unfinished();
                return Ok(1);
            }
            let outcome = self.poll_pass()?;
            if outcome.all_done {
                break;
            }
            if self.interrupted.load(Ordering::SeqCst) {
                self.report_unfinished();
                return Ok(1);
            }
            thread::sleep(self.poll_interval);
        }

        Ok(self.aggregate_code())
    }

    /// One pass over every tracked task.
    fn poll_pass(&mut self) -> Result<PassOutcome, HubError> {
        // Work queue: walk a snapshot of the current ids, accumulate new
        // children separately, merge once the pass is over.
        let current: Vec<TaskId> = self.tasks.keys().copied().collect();
        let mut discovered: Vec<TaskWatcher> = Vec::new();
        let mut all_done = true;

        for id in current {
            let Some(watcher) = self.tasks.get_mut(&id) else {
                continue;
            };
            if watcher.is_terminal() {
                continue;
            }

            let info = self.hub.get_task_info(id)?;
            let newly_terminal = info.state.is_terminal();
            if watcher.update(info) {
                self.reporter.progress(&watcher.transition_line());
            }
            let level = watcher.level;

            if newly_terminal {
                // One final child scan: anything discovered here still gets
                // at least one observation before the loop may exit.
                for child in self.hub.get_task_children(id)? {
                    if !self.tasks.contains_key(&child.id) {
                        discovered.push(TaskWatcher::new(child.id, level + 1));
                    }
                }
            } else {
                all_done = false;
            }
        }

        if !discovered.is_empty() {
            all_done = false;
            for watcher in discovered {
                self.tasks.insert(watcher.id, watcher);
            }
        }
        Ok(PassOutcome { all_done })
    }

    fn aggregate_code(&self) -> i32 {
        let mut code = 0;
        for &id in &self.roots {
            let Some(watcher) = self.tasks.get(&id) else {
                continue;
            };
            match watcher.state() {
                Some(TaskState::Closed) => {
                    self.reporter
                        .status(&format!("{} {} completed successfully", id, watcher.label()));
                }
                Some(state) => {
                    self.reporter.status(&format!(
                        "{} {} ended {}: {}",
                        id,
                        watcher.label(),
                        state.as_str(),
                        task_url(&self.web_url, id)
                    ));
                    code = 1;
                }
                None => code = 1,
            }
        }
        code
    }

    /// Print where every unfinished task stands, so the operator can resume
    /// watching by id later.
    fn report_unfinished(&self) {
        self.reporter.status("Watching interrupted; tasks are still running on the hub:");
        let mut unfinished: Vec<&TaskWatcher> =
            self.tasks.values().filter(|w| !w.is_terminal()).collect();
        unfinished.sort_by_key(|w| w.id);
        for watcher in unfinished {
            let state = watcher.state().map(TaskState::as_str).unwrap_or("UNKNOWN");
            self.reporter.status(&format!(
                "  {} {} is {}: {}",
                watcher.id,
                watcher.label(),
                state,
                task_url(&self.web_url, watcher.id)
            ));
        }
    }
}
