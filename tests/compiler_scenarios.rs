extern crate pipewright;

use pipewright::core::config::BackendSettings;
use pipewright::core::metadata::{ForgeInfo, PipelineInfo, Repo};
use pipewright::core::pipeline::builder::prune_missing_dependencies;
use pipewright::core::pipeline::ids::Ulid;
use pipewright::core::pipeline::source::sanitize_name;
use pipewright::core::pipeline::{link_steps, FixedRunIds, Item, PlanBuilder, SourceSpec};
use pipewright::core::secret::Secret;
use pipewright::core::types::{CancellationFlag, EventKind, WorkflowState};
use pipewright::core::ErrorKind;
use std::collections::HashMap;

fn spec(name: &str, yaml: &str) -> SourceSpec {
    SourceSpec::new(name, yaml.as_bytes().to_vec())
}

fn builder(sources: Vec<SourceSpec>) -> PlanBuilder {
    PlanBuilder {
        forge: ForgeInfo {
            kind: "gitea".to_string(),
            url: "https://forge.example".to_string(),
            platform: "linux/amd64".to_string(),
        },
        repo: Repo {
            owner: "octo".to_string(),
            name: "ship".to_string(),
            link: "https://forge.example/octo/ship".to_string(),
            clone_url: "https://forge.example/octo/ship.git".to_string(),
            default_branch: "main".to_string(),
            private: false,
            trusted: false,
        },
        curr: PipelineInfo {
            id: 42,
            number: 7,
            event: EventKind::Push,
            commit: "deadbeef".to_string(),
            branch: "main".to_string(),
            git_ref: "refs/heads/main".to_string(),
            ..Default::default()
        },
        prev: PipelineInfo::default(),
        netrc: None,
        secrets: Vec::new(),
        registries: Vec::new(),
        link: "https://ci.example/octo/ship/7".to_string(),
        sources,
        globals: HashMap::new(),
        settings: BackendSettings::default(),
        ids: Box::new(FixedRunIds(Ulid::from_parts(1_700_000_000_000, 99))),
        cancel: CancellationFlag::new(),
    }
}

const SINGLE_STEP: &str = "steps:\n  build:\n    image: alpine\n    commands:\n      - echo hi\n";

// One file, no matrix, one step: one item, one stage, one step, no
// privilege, prefixed container names.
#[test]
fn single_file_single_step() {
    let items = builder(vec![spec("build.yaml", SINGLE_STEP)]).build().unwrap();
    assert_eq!(items.len(), 1);

    let item = &items[0];
    assert_eq!(item.workflow.pid, 1);
    assert_eq!(item.workflow.name, "build");
    assert_eq!(item.workflow.state, WorkflowState::Pending);
    assert_eq!(item.config.stages.len(), 1);
    assert_eq!(item.config.stages[0].steps.len(), 1);

    let step = &item.config.stages[0].steps[0];
    assert!(!step.privileged);

    // Container names carry the wp_<ulid>_<id> prefix.
    let parts: Vec<&str> = step.name.splitn(4, '_').collect();
    assert_eq!(parts[0], "wp");
    assert_eq!(parts[1].len(), 26);
    assert!(parts[1]
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    assert!(parts[2].parse::<u64>().is_ok());
}

// Matrix 2x3: six items, dense pids, axis values in the environment,
// all sharing the sanitized file name.
#[test]
fn matrix_two_by_three() {
    let yaml = "matrix:\n  os: [linux, mac]\n  go: [1, 2, 3]\nsteps:\n  build:\n    image: alpine\n    commands: [go test]\n";
    let items = builder(vec![spec(".test.yaml", yaml)]).build().unwrap();
    assert_eq!(items.len(), 6);

    for (index, item) in items.iter().enumerate() {
        assert_eq!(item.workflow.pid, index as i64 + 1);
        assert_eq!(item.workflow.name, "test");
        let env = &item.config.stages[0].steps[0].environment;
        let os = item.workflow.axis.get("os").unwrap();
        let go = item.workflow.axis.get("go").unwrap();
        assert_eq!(env.get("os").unwrap(), os);
        assert_eq!(env.get("go").unwrap(), go);
    }
}

// A when-filter miss keeps the workflow in the output, terminally
// skipped.
#[test]
fn when_filter_miss_is_skipped_not_dropped() {
    let yaml = "when:\n  event: push\nsteps:\n  build:\n    image: alpine\n";
    let mut b = builder(vec![spec("build.yaml", yaml)]);
    b.curr.event = EventKind::PullRequest;
    let mut items = b.build().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].workflow.state, WorkflowState::Skipped);

    link_steps(&mut items);
    assert!(!items[0].workflow.children.is_empty());
    assert!(items[0]
        .workflow
        .children
        .iter()
        .all(|step| step.state == WorkflowState::Skipped));
}

// Unresolved dependencies are pruned transitively; an empty surviving
// set is not an error.
#[test]
fn unresolved_dependencies_prune_transitively() {
    let a = "depends_on: [b]\nsteps:\n  build:\n    image: alpine\n";
    let c = "depends_on: [a]\nsteps:\n  build:\n    image: alpine\n";
    let items = builder(vec![spec("a.yaml", a), spec("c.yaml", c)])
        .build()
        .unwrap();
    assert!(items.is_empty());
}

// Survivors that are all skipped fail the compilation.
#[test]
fn all_skipped_has_no_startpoint() {
    let yaml = "when:\n  event: tag\nsteps:\n  build:\n    image: alpine\n";
    let err = builder(vec![spec("a.yaml", yaml), spec("b.yaml", yaml)])
        .build()
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoStartpoint);
}

// An untrusted privileged request compiles cleanly with the flag
// forced off.
#[test]
fn untrusted_privileged_request_is_refused_quietly() {
    let yaml = "steps:\n  build:\n    image: alpine\n    commands: [make]\n    privileged: true\n";
    let items = builder(vec![spec("build.yaml", yaml)]).build().unwrap();
    assert!(!items[0].config.stages[0].steps[0].privileged);
}

// A secret whose image allow-list misses the step image is withheld.
#[test]
fn secret_image_allow_list_withholds_value() {
    let yaml = "steps:\n  build:\n    image: alpine\n    commands: [make]\n    secrets: [TOKEN]\n";
    let mut b = builder(vec![spec("build.yaml", yaml)]);
    b.secrets = vec![Secret {
        name: "TOKEN".to_string(),
        value: "hunter2".to_string(),
        images: vec!["plugins/*".to_string()],
        ..Default::default()
    }];
    let items = b.build().unwrap();
    assert!(!items[0].config.stages[0].steps[0]
        .environment
        .contains_key("TOKEN"));
}

// A secret whose event allow-list misses the current event is
// withheld without error.
#[test]
fn secret_event_allow_list_withholds_value() {
    let yaml = "steps:\n  build:\n    image: alpine\n    commands: [make]\n    secrets: [TOKEN]\n";
    let mut b = builder(vec![spec("build.yaml", yaml)]);
    b.secrets = vec![Secret {
        name: "TOKEN".to_string(),
        value: "hunter2".to_string(),
        events: vec![EventKind::Tag],
        ..Default::default()
    }];
    let items = b.build().unwrap();
    assert!(!items[0].config.stages[0].steps[0]
        .environment
        .contains_key("TOKEN"));
}

// Two compilations with a fixed identifier source serialize
// byte-identically.
#[test]
fn compilation_is_deterministic_with_fixed_ids() {
    let sources = vec![
        spec("a.yaml", "matrix:\n  go: [1, 2]\nsteps:\n  build:\n    image: alpine\n    commands: [go build]\n"),
        spec("b.yaml", SINGLE_STEP),
    ];

    let run = |sources: Vec<SourceSpec>| {
        let mut items = builder(sources).build().unwrap();
        link_steps(&mut items);
        serde_json::to_string(&items).unwrap()
    };

    assert_eq!(run(sources.clone()), run(sources));
}

// Item cardinality equals the sum of matrix sizes (1 for files with no
// matrix).
#[test]
fn matrix_totality() {
    let items = builder(vec![
        spec("a.yaml", "matrix:\n  os: [linux, mac]\n  go: [1, 2, 3]\nsteps:\n  build:\n    image: alpine\n"),
        spec("b.yaml", SINGLE_STEP),
    ])
    .build()
    .unwrap();
    assert_eq!(items.len(), 7);
}

// Metadata beats caller globals for colliding names.
#[test]
fn metadata_wins_over_globals() {
    let mut b = builder(vec![spec("build.yaml", SINGLE_STEP)]);
    b.globals
        .insert("CI_COMMIT_SHA".to_string(), "forged".to_string());
    b.globals.insert("EXTRA".to_string(), "kept".to_string());
    let items = b.build().unwrap();
    let env = &items[0].config.stages[0].steps[0].environment;
    assert_eq!(env.get("CI_COMMIT_SHA").unwrap(), "deadbeef");
    assert_eq!(env.get("EXTRA").unwrap(), "kept");
}

// Privilege needs both trust and the escalation list.
#[test]
fn privilege_needs_trust_and_escalation() {
    let yaml = "steps:\n  dind:\n    image: plugins/docker\n    commands: [docker build .]\n";

    // Trusted repo, image not escalated.
    let mut trusted_only = builder(vec![spec("build.yaml", yaml)]);
    trusted_only.repo.trusted = true;
    let items = trusted_only.build().unwrap();
    assert!(!items[0].config.stages[0].steps[0].privileged);

    // Untrusted repo, image escalated.
    let mut escalated_only = builder(vec![spec("build.yaml", yaml)]);
    escalated_only.settings.privileged = vec!["plugins/docker".to_string()];
    let items = escalated_only.build().unwrap();
    assert!(!items[0].config.stages[0].steps[0].privileged);

    // Both: privileged.
    let mut both = builder(vec![spec("build.yaml", yaml)]);
    both.repo.trusted = true;
    both.settings.privileged = vec!["plugins/docker".to_string()];
    let items = both.build().unwrap();
    assert!(items[0].config.stages[0].steps[0].privileged);
}

// After reconciliation every surviving dependency resolves, and
// reconciling again changes nothing.
#[test]
fn dependency_closure_and_idempotent_reconciliation() {
    let a = "steps:\n  build:\n    image: alpine\n";
    let b = "depends_on: [a]\nsteps:\n  build:\n    image: alpine\n";
    let c = "depends_on: [ghost]\nsteps:\n  build:\n    image: alpine\n";
    let items = builder(vec![spec("a.yaml", a), spec("b.yaml", b), spec("c.yaml", c)])
        .build()
        .unwrap();

    let names: Vec<&str> = items.iter().map(|i| i.workflow.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    for item in &items {
        for dep in &item.depends_on {
            assert!(names.contains(&dep.as_str()));
        }
    }

    let again: Vec<Item> = prune_missing_dependencies(items.clone());
    let names_again: Vec<&str> = again.iter().map(|i| i.workflow.name.as_str()).collect();
    assert_eq!(names, names_again);
}

// Workflow pids form a dense 1..n sequence; step pids continue it,
// strictly increasing with stage group ids.
#[test]
fn pid_sequence_is_dense_and_monotonic() {
    let mut items = builder(vec![
        spec("a.yaml", "matrix:\n  go: [1, 2]\nsteps:\n  build:\n    image: alpine\n"),
        spec(
            "b.yaml",
            "services:\n  db:\n    image: postgres\nsteps:\n  one:\n    image: alpine\n  two:\n    image: alpine\n",
        ),
    ])
    .build()
    .unwrap();

    for (index, item) in items.iter().enumerate() {
        assert_eq!(item.workflow.pid, index as i64 + 1);
    }

    link_steps(&mut items);
    let mut last = items.last().unwrap().workflow.pid;
    for item in &items {
        for step in &item.workflow.children {
            assert_eq!(step.pid, last + 1);
            assert_eq!(step.ppid, item.workflow.pid);
            assert!(step.gid <= step.pid);
            last = step.pid;
        }
    }
}

// Stage boundaries stamp a shared group id.
#[test]
fn stage_boundaries_share_group_ids() {
    let yaml = "services:\n  db:\n    image: postgres\nsteps:\n  one:\n    image: alpine\n  two:\n    image: alpine\n";
    let mut items = builder(vec![spec("build.yaml", yaml)]).build().unwrap();
    link_steps(&mut items);

    let children = &items[0].workflow.children;
    assert_eq!(children.len(), 3);
    // Stage 1: the service. Stage 2: both user steps share one gid.
    assert_eq!(children[0].gid, children[0].pid);
    assert_eq!(children[1].gid, children[2].gid);
    assert_eq!(children[1].gid, children[1].pid);
}

#[test]
fn sanitize_name_is_idempotent() {
    for name in [".build.yml", "dir/nested.yaml", "plain", "..odd.yml.yaml"] {
        let once = sanitize_name(name);
        assert_eq!(sanitize_name(&once), once);
    }
}

#[test]
fn empty_source_set_is_an_error() {
    let err = builder(Vec::new()).build().unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptySet);
}

#[test]
fn duplicate_workflow_names_across_files_are_rejected() {
    let err = builder(vec![
        spec("build.yml", SINGLE_STEP),
        spec("build.yaml", SINGLE_STEP),
    ])
    .build()
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateWorkflowName);
}

#[test]
fn oversized_matrix_fails() {
    let mut b = builder(vec![spec(
        "build.yaml",
        "matrix:\n  a: [1, 2, 3, 4]\n  b: [1, 2, 3, 4]\nsteps:\n  build:\n    image: alpine\n",
    )]);
    b.settings.max_matrix_jobs = 9;
    let err = b.build().unwrap_err();
    assert_eq!(err.kind, ErrorKind::MatrixTooLarge);
}

#[test]
fn substitution_errors_name_the_file() {
    let err = builder(vec![spec(
        "build.yaml",
        "steps:\n  build:\n    image: alpine:${MISSING_TAG}\n",
    )])
    .build()
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Substitution);
    assert_eq!(err.file.as_deref(), Some("build.yaml"));
}

#[test]
fn matrix_values_can_shape_the_file() {
    let yaml = "matrix:\n  TAG: ['3.19', '3.20']\nsteps:\n  build:\n    image: alpine:${TAG}\n";
    let items = builder(vec![spec("build.yaml", yaml)]).build().unwrap();
    let images: Vec<&str> = items
        .iter()
        .map(|i| i.config.stages[0].steps[0].image.as_str())
        .collect();
    assert_eq!(images, vec!["alpine:3.19", "alpine:3.20"]);
}

#[test]
fn when_filter_failure_aborts_compilation() {
    let yaml = "when:\n  eval: 'NOT_A_VARIABLE > 3'\nsteps:\n  build:\n    image: alpine\n";
    let err = builder(vec![spec("build.yaml", yaml)]).build().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Filter);
}

#[test]
fn lint_failure_names_file_and_location() {
    let yaml = "steps:\n  build:\n    commands: [make]\n";
    let err = builder(vec![spec("build.yaml", yaml)]).build().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lint);
    assert_eq!(err.file.as_deref(), Some("build.yaml"));
    assert!(err.location.is_some());
}

#[test]
fn cancellation_aborts_between_boundaries() {
    let b = builder(vec![spec("build.yaml", SINGLE_STEP)]);
    b.cancel.cancel();
    let err = b.build().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

// A matrix coordinate that disables every step drops that item without
// notice while its siblings survive.
#[test]
fn empty_plans_are_dropped_silently() {
    let yaml = "matrix:\n  os: [linux, mac]\nsteps:\n  build:\n    image: alpine\n    when:\n      matrix:\n        os: linux\n";
    let items = builder(vec![spec("build.yaml", yaml)]).build().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].workflow.axis.get("os").unwrap(), "linux");
    // The surviving sibling keeps a dense pid sequence.
    assert_eq!(items[0].workflow.pid, 1);
}
