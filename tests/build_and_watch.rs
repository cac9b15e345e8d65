//! End-to-end: submit against the mock hub, then watch the task.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use forgepkg::hub::{BuildOptions, BuildTarget, TagInfo, TaskState};
use forgepkg::mock::{FakeVcs, MockHub};
use forgepkg::vcs::BranchProfile;
use forgepkg::{BuildSubmitter, Reporter, TaskRegistry};

const ANONGIT: &str = "git://pkgs.example.org";
const WEB_URL: &str = "https://hub.example.org/forge";

fn hub() -> MockHub {
    let hub = MockHub::new();
    hub.add_target(BuildTarget {
        id: 1,
        name: "dist-f13-updates-candidate".to_string(),
        build_tag: 10,
        build_tag_name: "dist-f13-build".to_string(),
        dest_tag: 20,
        dest_tag_name: "dist-f13-updates-candidate-tag".to_string(),
    });
    hub.add_tag(TagInfo {
        id: 20,
        name: "dist-f13-updates-candidate-tag".to_string(),
        locked: false,
    });
    hub
}

fn watch(hub: &MockHub, reporter: &Reporter, id: u64) -> i32 {
    TaskRegistry::new(
        hub,
        reporter,
        WEB_URL,
        Duration::ZERO,
        Arc::new(AtomicBool::new(false)),
    )
    .poll_until_done(&[id])
    .unwrap()
}

#[test]
fn successful_build_ends_with_exit_code_zero() {
    let hub = hub();
    hub.script_next_build(vec![TaskState::Open, TaskState::Closed]);
    let vcs = FakeVcs::new();
    let profile = BranchProfile::from_branch("F-13").unwrap();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);
    let reporter = Reporter::memory();

    let task_id = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap();
    let code = watch(&hub, &reporter, task_id);

    assert_eq!(code, 0);
    let lines = reporter.lines();
    assert!(lines.iter().any(|l| l.contains("OPEN")));
    assert!(lines.iter().any(|l| l.contains("completed successfully")));
}

#[test]
fn failed_build_ends_with_exit_code_one() {
    let hub = hub();
    hub.script_next_build(vec![TaskState::Open, TaskState::Failed]);
    let vcs = FakeVcs::new();
    let profile = BranchProfile::from_branch("F-13").unwrap();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);
    let reporter = Reporter::memory();

    let task_id = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap();
    let code = watch(&hub, &reporter, task_id);

    assert_eq!(code, 1);
    assert!(reporter
        .lines()
        .iter()
        .any(|l| l.contains("FAILED") || l.contains("ended FAILED")));
}
