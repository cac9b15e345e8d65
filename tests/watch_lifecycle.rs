//! Task watching lifecycle tests.
//!
//! The registry polls a scripted mock hub with a zero interval, so each
//! `get_task_info` call corresponds to one observation of one task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forgepkg::hub::{TaskId, TaskInfo, TaskState};
use forgepkg::mock::MockHub;
use forgepkg::{Reporter, TaskRegistry};

const WEB_URL: &str = "https://hub.example.org/forge";

fn info(id: TaskId, parent: Option<TaskId>, state: TaskState) -> TaskInfo {
    TaskInfo {
        id,
        parent,
        state,
        method: "build".to_string(),
        arch: None,
        host_id: None,
    }
}

fn registry<'a>(hub: &'a MockHub, reporter: &'a Reporter) -> TaskRegistry<'a> {
    TaskRegistry::new(
        hub,
        reporter,
        WEB_URL,
        Duration::ZERO,
        Arc::new(AtomicBool::new(false)),
    )
}

#[test]
fn root_open_then_closed_exits_zero() {
    let hub = MockHub::new();
    hub.insert_task(
        info(1, None, TaskState::Free),
        vec![TaskState::Open, TaskState::Closed],
    );
    let reporter = Reporter::memory();

    let code = registry(&hub, &reporter).poll_until_done(&[1]).unwrap();

    assert_eq!(code, 0);
    let lines = reporter.lines();
    assert!(lines.iter().any(|l| l.contains("1 build: OPEN")));
    assert!(lines.iter().any(|l| l.contains("1 build: CLOSED")));
}

#[test]
fn failed_root_exits_one() {
    let hub = MockHub::new();
    hub.insert_task(
        info(1, None, TaskState::Free),
        vec![TaskState::Open, TaskState::Failed],
    );
    let reporter = Reporter::memory();

    let code = registry(&hub, &reporter).poll_until_done(&[1]).unwrap();

    assert_eq!(code, 1);
}

#[test]
fn canceled_root_exits_one() {
    let hub = MockHub::new();
    hub.insert_task(info(1, None, TaskState::Free), vec![TaskState::Canceled]);
    let reporter = Reporter::memory();

    let code = registry(&hub, &reporter).poll_until_done(&[1]).unwrap();

    assert_eq!(code, 1);
}

#[test]
fn child_failure_does_not_flip_a_closed_root() {
    let hub = MockHub::new();
    hub.insert_task(
        info(1, None, TaskState::Free),
        vec![TaskState::Open, TaskState::Closed],
    );
    hub.add_child(1, info(2, Some(1), TaskState::Failed), vec![TaskState::Failed]);
    let reporter = Reporter::memory();

    let code = registry(&hub, &reporter).poll_until_done(&[1]).unwrap();

    // Only the root outcome is authoritative for the requester.
    assert_eq!(code, 0);
}

#[test]
fn any_failed_root_wins_over_other_successes() {
    let hub = MockHub::new();
    hub.insert_task(info(1, None, TaskState::Free), vec![TaskState::Closed]);
    hub.insert_task(info(2, None, TaskState::Free), vec![TaskState::Failed]);
    let reporter = Reporter::memory();

    let code = registry(&hub, &reporter).poll_until_done(&[1, 2]).unwrap();

    assert_eq!(code, 1);
}

#[test]
fn children_discovered_at_completion_are_observed() {
    let hub = MockHub::new();
    // Root closes on its first observation; the child only becomes known
    // through the final child scan and must still be polled to completion.
    hub.insert_task(info(1, None, TaskState::Free), vec![TaskState::Closed]);
    hub.add_child(
        1,
        info(2, Some(1), TaskState::Open),
        vec![TaskState::Open, TaskState::Closed],
    );
    let reporter = Reporter::memory();

    let code = registry(&hub, &reporter).poll_until_done(&[1]).unwrap();

    assert_eq!(code, 0);
    assert!(hub.info_query_count(2) >= 1);
    let lines = reporter.lines();
    // child transitions are indented one level
    assert!(lines.iter().any(|l| l.contains("  2 build: OPEN")));
}

#[test]
fn terminal_tasks_are_never_polled_again() {
    let hub = MockHub::new();
    hub.insert_task(info(1, None, TaskState::Free), vec![TaskState::Closed]);
    // Keep a second task running for a few passes after task 1 completes.
    hub.insert_task(
        info(2, None, TaskState::Free),
        vec![
            TaskState::Open,
            TaskState::Open,
            TaskState::Open,
            TaskState::Closed,
        ],
    );
    let reporter = Reporter::memory();

    registry(&hub, &reporter).poll_until_done(&[1, 2]).unwrap();

    assert_eq!(hub.info_query_count(1), 1);
    assert_eq!(hub.info_query_count(2), 4);
}

#[test]
fn repeated_states_are_not_reported_again() {
    let hub = MockHub::new();
    hub.insert_task(
        info(1, None, TaskState::Free),
        vec![TaskState::Open, TaskState::Open, TaskState::Open, TaskState::Closed],
    );
    let reporter = Reporter::memory();

    registry(&hub, &reporter).poll_until_done(&[1]).unwrap();

    let open_lines = reporter
        .lines()
        .iter()
        .filter(|l| l.contains("1 build: OPEN"))
        .count();
    assert_eq!(open_lines, 1);
}

#[test]
fn interrupt_stops_watching_and_lists_unfinished_tasks() {
    let hub = MockHub::new();
    hub.insert_task(
        info(1, None, TaskState::Free),
        vec![TaskState::Open, TaskState::Open, TaskState::Closed],
    );
    let reporter = Reporter::memory();
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut registry = TaskRegistry::new(
        &hub,
        &reporter,
        WEB_URL,
        Duration::ZERO,
        Arc::clone(&interrupted),
    );

    // Interrupt "arrives" before the first pass.
    interrupted.store(true, Ordering::SeqCst);
    let code = registry.poll_until_done(&[1]).unwrap();

    assert_eq!(code, 1);
    // The task was never cancelled remotely and its id is printed for
    // resumption.
    let lines = reporter.lines();
    assert!(lines
        .iter()
        .any(|l| l.contains("taskinfo?taskID=1")));
    assert_eq!(hub.info_query_count(1), 0);
}

#[test]
fn quiet_mode_changes_output_not_exit_codes() {
    let hub = MockHub::new();
    hub.insert_task(
        info(1, None, TaskState::Free),
        vec![TaskState::Open, TaskState::Failed],
    );
    let reporter = Reporter::stdout(true);

    let code = registry(&hub, &reporter).poll_until_done(&[1]).unwrap();

    assert_eq!(code, 1);
}
