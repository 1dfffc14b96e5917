//! Resolution engine.
//!
//! Drives a validated tool list to terminal states with bounded retries
//! and knowledge-informed recovery. Per tool the state machine is
//! `Pending -> Attempting -> {Succeeded | Retrying | Escalating |
//! Failed}`; Retrying and Escalating return to Attempting with a new
//! command. On failure the escalation ladder is consulted in order:
//! similar-error fix from the knowledge store, oracle-proposed fix,
//! static package-manager strategies. Every distinct command attempt
//! counts toward the per-tool budget.
//!
//! One tool failing never aborts the run; the engine reports partial
//! success. Exactly one install event is recorded per tool, at its
//! terminal state. Oracle fixes that worked are written back to the
//! knowledge store after the run so the next run resolves them without
//! an oracle call.

pub mod order;
pub mod recovery;
pub mod report;
pub mod validate;

use crate::oracle::{CommandCandidate, OracleContext, RecommendationOracle, ToolCandidate};
use chrono::Utc;
use recovery::{fallback_commands, PackageManager};
use report::{RunReport, ToolOutcome, ToolReport};
use rig_common::error::{Result, RigError};
use rig_common::{
    normalize_name, CommandRunner, ErrorRecord, FixRecord, HostInfo, InstallEvent, KnowledgeStore,
    RelationKind, RigConfig, Tool,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validate::{detect_domain, fallback_stack, merge_candidates, validate_stack};

/// Per-tool installation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolState {
    Pending,
    Attempting,
    Retrying,
    Escalating,
    Succeeded,
    Failed,
}

impl ToolState {
    fn as_str(&self) -> &'static str {
        match self {
            ToolState::Pending => "pending",
            ToolState::Attempting => "attempting",
            ToolState::Retrying => "retrying",
            ToolState::Escalating => "escalating",
            ToolState::Succeeded => "succeeded",
            ToolState::Failed => "failed",
        }
    }
}

/// How the next command was obtained.
enum Recovery {
    Knowledge(String),
    Oracle(CommandCandidate),
    Static(String),
}

/// An oracle fix that worked, queued for post-run writeback.
struct LearnedFix {
    tool: String,
    error_text: String,
    candidate: CommandCandidate,
}

pub struct ResolutionEngine<'a> {
    store: &'a KnowledgeStore,
    oracle: &'a dyn RecommendationOracle,
    runner: &'a dyn CommandRunner,
    config: RigConfig,
    cancelled: Arc<AtomicBool>,
}

impl<'a> ResolutionEngine<'a> {
    pub fn new(
        store: &'a KnowledgeStore,
        oracle: &'a dyn RecommendationOracle,
        runner: &'a dyn CommandRunner,
        config: RigConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            runner,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cooperative cancellation. Setting it stops scheduling
    /// new tools; an in-flight attempt finishes or times out.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Resolve a full stack for `domain`: gather and validate candidates,
    /// order them, drive each to a terminal state, write learned fixes
    /// back, and return the run report.
    pub async fn run(&self, domain: &str) -> Result<RunReport> {
        let started_at = Utc::now();
        let host = HostInfo::detect();
        info!(domain, host = %host.summary(), "resolution run starting");

        let context = OracleContext {
            host: host.clone(),
            prior_success_rate: self
                .store
                .statistics(self.config.knowledge.stats_window_days)
                .ok()
                .filter(|s| s.total_events > 0)
                .map(|s| s.success_rate()),
        };

        let manager = PackageManager::detect();
        let candidates = self.gather_candidates(domain, &context, manager).await?;
        self.remember_candidates(&candidates);
        let ordered = order::dependency_order(candidates, self.store);
        info!(tools = ordered.len(), "stack validated and ordered");

        let mut learned: Vec<LearnedFix> = Vec::new();
        let mut tools = Vec::new();
        for candidate in &ordered {
            if self.cancelled.load(Ordering::SeqCst) {
                debug!(tool = %candidate.name, "run cancelled, not scheduling");
                tools.push(ToolReport {
                    name: normalize_name(&candidate.name),
                    outcome: ToolOutcome::Skipped,
                    command: candidate.install_command.clone(),
                    attempts: 0,
                    duration_ms: 0,
                    error: None,
                });
                continue;
            }
            tools.push(self.resolve_tool(candidate, manager, &host, &mut learned).await);
        }

        self.write_back_fixes(learned);

        let report = RunReport {
            run_id: format!("run-{}", Uuid::new_v4()),
            domain: domain.to_string(),
            host,
            started_at,
            finished_at: Utc::now(),
            tools,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "resolution run finished"
        );
        Ok(report)
    }

    /// Obtain a validated candidate list: oracle first, one strict
    /// re-prompt on rejection, then the static domain stack as filler.
    async fn gather_candidates(
        &self,
        domain: &str,
        context: &OracleContext,
        manager: Option<PackageManager>,
    ) -> Result<Vec<ToolCandidate>> {
        let domain_kind = detect_domain(domain);

        let mut candidates = match self.oracle.propose_stack(domain, context, false).await {
            Ok(proposal) => proposal.tools,
            Err(e) => {
                warn!("oracle unreachable: {:#}", e);
                let fallback = fallback_stack(domain_kind, manager);
                if fallback.is_empty() {
                    return Err(RigError::OracleUnavailable(
                        "no stack could be produced for this domain".to_string(),
                    ));
                }
                info!(domain = domain_kind.as_str(), "using static fallback stack");
                return Ok(fallback);
            }
        };

        if let Err(reason) = validate_stack(&candidates, &self.config.engine) {
            warn!(%reason, "candidate stack rejected, re-prompting once");
            match self.oracle.propose_stack(domain, context, true).await {
                Ok(proposal) if !proposal.tools.is_empty() => {
                    candidates = merge_candidates(proposal.tools, candidates);
                }
                Ok(_) => {}
                Err(e) => warn!("strict re-prompt failed: {:#}", e),
            }

            if let Err(reason) = validate_stack(&candidates, &self.config.engine) {
                info!(%reason, domain = domain_kind.as_str(), "merging static fallback stack");
                candidates = merge_candidates(candidates, fallback_stack(domain_kind, manager));
            }
        }

        Ok(candidates)
    }

    /// Persist candidates as tools plus their dependency edges, so
    /// ordering and future runs can use them.
    fn remember_candidates(&self, candidates: &[ToolCandidate]) {
        for candidate in candidates {
            let tool = Tool {
                description: candidate.description.clone(),
                check_command: candidate.check_command.clone(),
                priority: candidate.priority,
                ..Tool::new(&candidate.name, candidate.category, &candidate.install_command)
            };
            if let Err(e) = self.store.upsert_tool(tool) {
                warn!(tool = %candidate.name, "could not store tool: {}", e);
            }
            for dep in &candidate.depends_on {
                if let Err(e) =
                    self.store
                        .add_relationship(&candidate.name, RelationKind::DependsOn, dep)
                {
                    warn!(tool = %candidate.name, %dep, "could not store dependency: {}", e);
                }
            }
        }
    }

    /// Drive one tool to a terminal state and record its install event.
    async fn resolve_tool(
        &self,
        candidate: &ToolCandidate,
        manager: Option<PackageManager>,
        host: &HostInfo,
        learned: &mut Vec<LearnedFix>,
    ) -> ToolReport {
        let name = normalize_name(&candidate.name);
        let install_timeout = Duration::from_secs(self.config.engine.install_timeout_secs);
        let check_timeout = Duration::from_secs(self.config.engine.check_timeout_secs);
        let start = Instant::now();

        let mut state = ToolState::Pending;
        debug!(tool = %name, state = state.as_str(), "queued");
        let mut command = candidate.install_command.clone();
        let mut tried: HashSet<String> = HashSet::new();
        let mut statics: VecDeque<String> = fallback_commands(candidate, manager).into();
        let mut attempts = 0u32;
        let mut last_error: Option<String> = None;
        let mut oracle_fix: Option<(String, CommandCandidate)> = None;

        loop {
            state = ToolState::Attempting;
            attempts += 1;
            debug!(tool = %name, state = state.as_str(), %command, attempt = attempts, "attempting install");
            tried.insert(command.clone());

            let outcome = self.runner.execute(&command, install_timeout).await;
            let failure = if outcome.success() {
                self.confirm_install(candidate, check_timeout).await
            } else {
                Some(outcome.error_text().trim().to_string())
            };

            let Some(error_text) = failure else {
                state = ToolState::Succeeded;
                if let Some((text, fix)) = oracle_fix.take() {
                    if fix.command == command {
                        learned.push(LearnedFix {
                            tool: name.clone(),
                            error_text: text,
                            candidate: fix,
                        });
                    }
                }
                break;
            };

            debug!(tool = %name, error = %error_text, "attempt failed");
            last_error = Some(error_text.clone());

            // A fix that itself failed is not worth learning
            if oracle_fix
                .as_ref()
                .map(|(_, fix)| fix.command == command)
                .unwrap_or(false)
            {
                oracle_fix = None;
            }

            if attempts >= self.config.engine.max_attempts {
                debug!(tool = %name, attempts, "attempt budget exhausted");
                state = ToolState::Failed;
                break;
            }

            match self
                .next_command(&name, &command, &error_text, &tried, &mut statics)
                .await
            {
                Some(Recovery::Knowledge(next)) => {
                    state = ToolState::Escalating;
                    debug!(tool = %name, state = state.as_str(), %next, "known fix selected");
                    command = next;
                }
                Some(Recovery::Oracle(fix)) => {
                    state = ToolState::Escalating;
                    debug!(tool = %name, state = state.as_str(), next = %fix.command, "oracle fix selected");
                    command = fix.command.clone();
                    oracle_fix = Some((error_text, fix));
                }
                Some(Recovery::Static(next)) => {
                    state = ToolState::Retrying;
                    debug!(tool = %name, state = state.as_str(), %next, "static strategy selected");
                    command = next;
                }
                None => {
                    debug!(tool = %name, "no recovery strategies left");
                    state = ToolState::Failed;
                    break;
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let success = state == ToolState::Succeeded;
        let event = InstallEvent {
            tool_name: name.clone(),
            command_used: command.clone(),
            success,
            attempts,
            duration_ms,
            os_type: host.os_type.clone(),
            architecture: host.architecture.clone(),
            error_message: if success { None } else { last_error.clone() },
            ..InstallEvent::new(&name, &command, success)
        };
        if let Err(e) = self.store.record_install_event(event) {
            warn!(tool = %name, "could not record install event: {}", e);
        }

        if success {
            info!(tool = %name, attempts, "installed");
        } else {
            info!(tool = %name, attempts, "could not be installed");
        }

        ToolReport {
            name,
            outcome: if success {
                ToolOutcome::Succeeded
            } else {
                ToolOutcome::Failed
            },
            command,
            attempts,
            duration_ms,
            error: if success { None } else { last_error },
        }
    }

    /// Run the check command after a zero-exit install. A non-zero check
    /// is treated as a failed attempt.
    async fn confirm_install(
        &self,
        candidate: &ToolCandidate,
        check_timeout: Duration,
    ) -> Option<String> {
        let check = candidate.check_command.trim();
        if check.is_empty() {
            return None;
        }
        let outcome = self.runner.execute(check, check_timeout).await;
        if outcome.success() {
            None
        } else {
            Some(format!(
                "check command failed: {}",
                outcome.error_text().trim()
            ))
        }
    }

    /// The escalation ladder: knowledge store fix, oracle fix, static
    /// strategy. Commands already tried are skipped.
    async fn next_command(
        &self,
        tool: &str,
        failed_command: &str,
        error_text: &str,
        tried: &HashSet<String>,
        statics: &mut VecDeque<String>,
    ) -> Option<Recovery> {
        match self.store.similar_fix(
            error_text,
            self.config.knowledge.similarity_top_k,
            self.config.knowledge.similarity_threshold,
        ) {
            Ok(Some((hit, fix))) if !tried.contains(&fix.command) => {
                info!(tool, score = hit.score, "similar error has a known fix");
                return Some(Recovery::Knowledge(fix.command));
            }
            Ok(_) => {}
            Err(e) => warn!("fix lookup failed: {}", e),
        }

        match self.oracle.propose_fix(tool, failed_command, error_text).await {
            Ok(Some(fix)) if !tried.contains(&fix.command) => {
                return Some(Recovery::Oracle(fix));
            }
            Ok(_) => {}
            Err(e) => debug!("oracle had no fix: {:#}", e),
        }

        while let Some(command) = statics.pop_front() {
            if !tried.contains(&command) {
                return Some(Recovery::Static(command));
            }
        }
        None
    }

    /// Persist error/fix pairs learned from oracle suggestions that
    /// worked, so future runs resolve them via similarity search alone.
    fn write_back_fixes(&self, learned: Vec<LearnedFix>) {
        for fix in learned {
            let error = ErrorRecord::new(&fix.error_text, Some(&fix.tool));
            let description = if fix.candidate.description.is_empty() {
                format!("alternative install for {}", fix.tool)
            } else {
                fix.candidate.description.clone()
            };
            let record = FixRecord::new(
                &description,
                &fix.candidate.command,
                "suggested after a failed install and confirmed working",
            );
            match self.store.learn_fix(error, record) {
                Ok(_) => info!(tool = %fix.tool, "fix written back to knowledge store"),
                Err(e) => warn!(tool = %fix.tool, "could not write back fix: {}", e),
            }
        }
    }
}
