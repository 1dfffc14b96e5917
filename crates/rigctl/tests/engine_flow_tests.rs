//! End-to-end resolution engine tests with scripted collaborators.
//!
//! Every scenario runs against an in-memory knowledge store, a scripted
//! oracle and a scripted command runner, so outcomes are deterministic
//! and nothing touches the host system.

use rig_common::{
    ErrorRecord, FixRecord, KnowledgeStore, RigConfig, ScriptedRunner, ToolCategory,
};
use rigctl::{
    ResolutionEngine, ScriptedOracle, StackProposal, ToolCandidate, ToolOutcome,
};

/// Config with validation relaxed so small scripted stacks pass.
fn small_stack_config(max_attempts: u32) -> RigConfig {
    let mut config = RigConfig::default();
    config.engine.min_tools = 1;
    config.engine.required_categories = Vec::new();
    config.engine.max_attempts = max_attempts;
    config
}

fn proposal(tools: Vec<ToolCandidate>) -> StackProposal {
    StackProposal {
        tools,
        confidence: 0.9,
    }
}

#[tokio::test]
async fn partial_failure_does_not_abort_the_run() {
    let store = KnowledgeStore::in_memory();
    let oracle = ScriptedOracle::new().queue_stack(proposal(vec![
        ToolCandidate::new("git", ToolCategory::VersionControl, "ok-cmd git"),
        ToolCandidate::new("weird-tool", ToolCategory::Other, "bad-cmd weird-tool"),
    ]));
    let runner = ScriptedRunner::new().succeed_on("ok-cmd");

    let engine = ResolutionEngine::new(&store, &oracle, &runner, small_stack_config(3));
    let report = engine.run("test stack").await.unwrap();

    assert_eq!(report.tools.len(), 2);

    let git = report.tools.iter().find(|t| t.name == "git").unwrap();
    assert_eq!(git.outcome, ToolOutcome::Succeeded);
    assert_eq!(git.attempts, 1);

    let weird = report.tools.iter().find(|t| t.name == "weird-tool").unwrap();
    assert_eq!(weird.outcome, ToolOutcome::Failed);
    assert_eq!(weird.attempts, 3);
    assert!(weird.error.is_some());

    // Exactly one install event per tool, terminal state only
    let events = store.recent_events(10).unwrap();
    assert_eq!(events.len(), 2);
    let weird_event = events.iter().find(|e| e.tool_name == "weird-tool").unwrap();
    assert_eq!(weird_event.attempts, 3);
    assert!(!weird_event.success);
    assert!(weird_event.error_message.is_some());
}

#[tokio::test]
async fn retry_budget_is_a_hard_bound() {
    let store = KnowledgeStore::in_memory();
    let oracle = ScriptedOracle::new().queue_stack(proposal(vec![ToolCandidate::new(
        "stubborn",
        ToolCategory::Other,
        "bad-cmd stubborn",
    )]));
    // Everything fails; the ladder has more rungs than the budget allows
    let runner = ScriptedRunner::new();

    let engine = ResolutionEngine::new(&store, &oracle, &runner, small_stack_config(2));
    let report = engine.run("test stack").await.unwrap();

    assert_eq!(report.tools[0].attempts, 2);
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn known_fix_resolves_without_oracle() {
    let store = KnowledgeStore::in_memory();
    store
        .learn_fix(
            ErrorRecord::new("permission denied", Some("blocked-tool")),
            FixRecord::new("escalate privileges", "sudo install-tool", ""),
        )
        .unwrap();

    let oracle = ScriptedOracle::new().queue_stack(proposal(vec![ToolCandidate::new(
        "blocked-tool",
        ToolCategory::Other,
        "install-tool",
    )]));
    // The sudo pattern must be registered first: first match wins
    let runner = ScriptedRunner::new()
        .succeed_on("sudo install-tool")
        .fail_on("install-tool", "permission denied: cannot write");

    let engine = ResolutionEngine::new(&store, &oracle, &runner, small_stack_config(3));
    let report = engine.run("test stack").await.unwrap();

    let tool = &report.tools[0];
    assert_eq!(tool.outcome, ToolOutcome::Succeeded);
    assert_eq!(tool.attempts, 2);
    assert_eq!(tool.command, "sudo install-tool");

    // The knowledge store answered; the oracle was never asked for a fix
    assert_eq!(oracle.fix_call_count(), 0);
}

#[tokio::test]
async fn inadequate_stack_is_reprompted_then_filled_from_fallback() {
    let store = KnowledgeStore::in_memory();

    let mut config = RigConfig::default();
    config.engine.min_tools = 8;

    let two_tools = vec![
        ToolCandidate::new("git", ToolCategory::VersionControl, "install git"),
        ToolCandidate::new("vim", ToolCategory::Editor, "install vim"),
    ];
    // Both the first answer and the strict re-prompt are inadequate
    let oracle = ScriptedOracle::new()
        .queue_stack(proposal(two_tools.clone()))
        .queue_stack(proposal(two_tools));

    let runner = ScriptedRunner::new().succeed_on("");

    let engine = ResolutionEngine::new(&store, &oracle, &runner, config);
    let report = engine.run("general development").await.unwrap();

    assert_eq!(oracle.stack_call_count(), 2);
    assert!(
        report.tools.len() >= 8,
        "fallback merge produced only {} tools",
        report.tools.len()
    );
    // The oracle's own picks survive the merge
    assert!(report.tools.iter().any(|t| t.name == "git"));
    assert!(report.tools.iter().any(|t| t.name == "vim"));
}

#[tokio::test]
async fn unreachable_oracle_falls_back_to_static_stack() {
    let store = KnowledgeStore::in_memory();
    // No queued proposals: every propose_stack call errors
    let oracle = ScriptedOracle::new();
    let runner = ScriptedRunner::new().succeed_on("");

    let engine = ResolutionEngine::new(&store, &oracle, &runner, RigConfig::default());
    let report = engine.run("python data science").await.unwrap();

    assert!(!report.tools.is_empty());
    assert!(report.tools.iter().any(|t| t.name == "python3"));
    assert!(report.tools.iter().all(|t| t.outcome == ToolOutcome::Succeeded));
}

#[tokio::test]
async fn failed_check_command_reenters_recovery() {
    let store = KnowledgeStore::in_memory();
    let oracle = ScriptedOracle::new().queue_stack(proposal(vec![ToolCandidate::new(
        "ghost",
        ToolCategory::Other,
        "fake-install ghost",
    )
    .with_check("ghost --version")]));
    // Install "succeeds" but the check never does
    let runner = ScriptedRunner::new()
        .succeed_on("fake-install")
        .fail_on("ghost --version", "ghost: not found");

    let engine = ResolutionEngine::new(&store, &oracle, &runner, small_stack_config(2));
    let report = engine.run("test stack").await.unwrap();

    let tool = &report.tools[0];
    assert_eq!(tool.outcome, ToolOutcome::Failed);
    // The zero-exit install did not count as success: the failed check
    // consumed attempt 1 and recovery spent attempt 2
    assert_eq!(tool.attempts, 2);
    assert!(tool.error.is_some());
    // install, check, then one recovery install
    assert_eq!(runner.calls().len(), 3);
}

#[tokio::test]
async fn cancellation_stops_scheduling_new_tools() {
    let store = KnowledgeStore::in_memory();
    let oracle = ScriptedOracle::new().queue_stack(proposal(vec![
        ToolCandidate::new("one", ToolCategory::Other, "install one"),
        ToolCandidate::new("two", ToolCategory::Other, "install two"),
    ]));
    let runner = ScriptedRunner::new().succeed_on("");

    let engine = ResolutionEngine::new(&store, &oracle, &runner, small_stack_config(3));
    engine
        .cancel_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let report = engine.run("test stack").await.unwrap();

    assert!(report
        .tools
        .iter()
        .all(|t| t.outcome == ToolOutcome::Skipped));
    // Skipped tools never reach a terminal state, so no events are logged
    assert!(store.recent_events(10).unwrap().is_empty());
}

#[tokio::test]
async fn dependencies_install_before_dependents() {
    let store = KnowledgeStore::in_memory();

    let mut docker = ToolCandidate::new("docker", ToolCategory::Container, "install docker");
    docker.priority = 9;
    docker.depends_on.push("curl".to_string());
    let curl = ToolCandidate::new("curl", ToolCategory::Other, "install curl").with_priority(1);

    let oracle = ScriptedOracle::new().queue_stack(proposal(vec![docker, curl]));
    let runner = ScriptedRunner::new().succeed_on("");

    let engine = ResolutionEngine::new(&store, &oracle, &runner, small_stack_config(3));
    let report = engine.run("devops").await.unwrap();

    let order: Vec<&str> = report.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(order, vec!["curl", "docker"]);
}
