//! Build submission validation tests.
//!
//! Every validation must fire before the hub sees a submission, so each
//! failing case also asserts that nothing was submitted.

use forgepkg::hub::{BuildOptions, BuildTarget, InheritanceEntry, TagInfo, TaskState};
use forgepkg::mock::{FakeVcs, MockHub, Submission};
use forgepkg::submit::SubmitError;
use forgepkg::vcs::BranchProfile;
use forgepkg::BuildSubmitter;

const ANONGIT: &str = "git://pkgs.example.org";

fn profile() -> BranchProfile {
    BranchProfile::from_branch("F-13").unwrap()
}

fn target() -> BuildTarget {
    BuildTarget {
        id: 1,
        name: "dist-f13-updates-candidate".to_string(),
        build_tag: 10,
        build_tag_name: "dist-f13-build".to_string(),
        dest_tag: 20,
        dest_tag_name: "dist-f13-updates-candidate-tag".to_string(),
    }
}

fn dest_tag(locked: bool) -> TagInfo {
    TagInfo {
        id: 20,
        name: "dist-f13-updates-candidate-tag".to_string(),
        locked,
    }
}

fn hub_with_unlocked_target() -> MockHub {
    let hub = MockHub::new();
    hub.add_target(target());
    hub.add_tag(dest_tag(false));
    hub
}

#[test]
fn clean_pushed_tree_submits_head_commit() {
    let hub = hub_with_unlocked_target();
    let vcs = FakeVcs::new().with_head("cafe0001");
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let task_id = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap();

    assert!(task_id >= 1000);
    assert_eq!(
        hub.submissions(),
        vec![Submission::Build {
            source: "git://pkgs.example.org/libwidget?#cafe0001".to_string(),
            target: "dist-f13-updates-candidate".to_string(),
            opts: BuildOptions::default(),
        }]
    );
}

#[test]
fn dirty_tree_is_rejected_before_submission() {
    let hub = hub_with_unlocked_target();
    let vcs = FakeVcs::new().with_dirty(true);
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let err = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap_err();

    assert!(matches!(err, SubmitError::UncommittedChanges));
    assert!(hub.submissions().is_empty());
}

#[test]
fn unpushed_commits_are_rejected_before_submission() {
    let hub = hub_with_unlocked_target();
    let vcs = FakeVcs::new().with_unpushed(true);
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let err = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap_err();

    assert!(matches!(err, SubmitError::UnpushedChanges));
    assert!(hub.submissions().is_empty());
}

#[test]
fn explicit_srpm_url_skips_tree_checks() {
    let hub = hub_with_unlocked_target();
    // A dirty tree must not matter when building from an uploaded artifact.
    let vcs = FakeVcs::new().with_dirty(true);
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    submitter
        .submit(
            &BuildOptions::default(),
            Some("https://hub.example.org/work/libwidget.src.rpm"),
            None,
        )
        .unwrap();

    assert_eq!(hub.submissions().len(), 1);
}

#[test]
fn unknown_target_is_reported_by_name() {
    let hub = MockHub::new();
    let vcs = FakeVcs::new();
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let err = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap_err();

    match err {
        SubmitError::UnknownTarget(name) => assert_eq!(name, "dist-f13-updates-candidate"),
        other => panic!("expected UnknownTarget, got {other:?}"),
    }
    assert!(hub.submissions().is_empty());
}

#[test]
fn missing_destination_tag_is_an_error() {
    let hub = MockHub::new();
    hub.add_target(target());
    let vcs = FakeVcs::new();
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let err = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap_err();

    assert!(matches!(err, SubmitError::UnknownTag(_)));
    assert!(hub.submissions().is_empty());
}

#[test]
fn locked_tag_rejects_regular_build_before_submission() {
    let hub = MockHub::new();
    hub.add_target(target());
    hub.add_tag(dest_tag(true));
    let vcs = FakeVcs::new();
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let err = submitter
        .submit(&BuildOptions::default(), None, None)
        .unwrap_err();

    assert!(matches!(err, SubmitError::LockedTag(_)));
    assert!(hub.submissions().is_empty());
}

#[test]
fn scratch_build_bypasses_the_lock() {
    let hub = MockHub::new();
    hub.add_target(target());
    hub.add_tag(dest_tag(true));
    let vcs = FakeVcs::new();
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let opts = BuildOptions {
        scratch: true,
        ..Default::default()
    };
    submitter.submit(&opts, None, None).unwrap();

    assert_eq!(hub.submissions().len(), 1);
}

#[test]
fn chain_build_requires_dest_tag_visible_from_build_tag() {
    let hub = hub_with_unlocked_target();
    // Inheritance chain that does not include the dest tag (id 20).
    hub.set_inheritance(
        10,
        vec![InheritanceEntry {
            parent_id: 99,
            name: "dist-f13".to_string(),
            priority: 0,
        }],
    );
    let vcs = FakeVcs::new();
    vcs.set_remote_head("libgizmo", "feed0002");
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let err = submitter
        .submit(
            &BuildOptions::default(),
            None,
            Some(&["libgizmo".to_string()]),
        )
        .unwrap_err();

    assert!(matches!(err, SubmitError::Inheritance { .. }));
    assert!(hub.submissions().is_empty());
}

#[test]
fn chain_build_submits_resolved_groups_with_self_last() {
    let hub = hub_with_unlocked_target();
    hub.set_inheritance(
        10,
        vec![InheritanceEntry {
            parent_id: 20,
            name: "dist-f13-updates-candidate-tag".to_string(),
            priority: 0,
        }],
    );
    hub.script_next_build(vec![TaskState::Open, TaskState::Closed]);
    let vcs = FakeVcs::new().with_head("cafe0001");
    vcs.set_remote_head("libgizmo", "feed0002");
    vcs.set_remote_head("libaselib", "feed0003");
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let tokens = vec![
        "libaselib".to_string(),
        ":".to_string(),
        "libgizmo".to_string(),
        ":".to_string(),
    ];
    submitter
        .submit(&BuildOptions::default(), None, Some(&tokens))
        .unwrap();

    assert_eq!(
        hub.submissions(),
        vec![Submission::ChainBuild {
            groups: vec![
                vec!["git://pkgs.example.org/libaselib?#feed0003".to_string()],
                vec!["git://pkgs.example.org/libgizmo?#feed0002".to_string()],
                vec!["git://pkgs.example.org/libwidget?#cafe0001".to_string()],
            ],
            target: "dist-f13-updates-candidate".to_string(),
            opts: BuildOptions::default(),
        }]
    );
}

#[test]
fn chain_self_reference_fails_before_any_network_call() {
    let hub = hub_with_unlocked_target();
    let vcs = FakeVcs::new();
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let tokens = vec!["libwidget".to_string(), ":".to_string(), "other".to_string()];
    let err = submitter
        .submit(&BuildOptions::default(), None, Some(&tokens))
        .unwrap_err();

    assert!(matches!(
        err,
        SubmitError::Chain(forgepkg::chain::ChainError::SelfReference(_))
    ));
    assert!(hub.submissions().is_empty());
}

#[test]
fn unresolvable_component_aborts_the_whole_chain() {
    let hub = hub_with_unlocked_target();
    hub.set_inheritance(
        10,
        vec![InheritanceEntry {
            parent_id: 20,
            name: "dist-f13-updates-candidate-tag".to_string(),
            priority: 0,
        }],
    );
    let vcs = FakeVcs::new();
    // libgizmo has no published head
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let err = submitter
        .submit(
            &BuildOptions::default(),
            None,
            Some(&["libgizmo".to_string()]),
        )
        .unwrap_err();

    match err {
        SubmitError::Chain(forgepkg::chain::ChainError::ComponentResolution {
            component, ..
        }) => assert_eq!(component, "libgizmo"),
        other => panic!("expected ComponentResolution, got {other:?}"),
    }
    assert!(hub.submissions().is_empty());
}

#[test]
fn background_build_carries_the_option() {
    let hub = hub_with_unlocked_target();
    let vcs = FakeVcs::new();
    let profile = profile();
    let submitter = BuildSubmitter::new(&hub, &vcs, &profile, "libwidget", ANONGIT);

    let opts = BuildOptions {
        background: true,
        skip_tag: true,
        ..Default::default()
    };
    submitter.submit(&opts, None, None).unwrap();

    match &hub.submissions()[0] {
        Submission::Build { opts, .. } => {
            assert!(opts.background);
            assert!(opts.skip_tag);
            assert_eq!(opts.priority(), Some(5));
        }
        other => panic!("expected single build, got {other:?}"),
    }
}
