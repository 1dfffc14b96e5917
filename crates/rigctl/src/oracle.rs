//! Recommendation oracle contract.
//!
//! The oracle is an external collaborator: something that can turn a
//! domain description into a candidate tool stack, and suggest an
//! alternative command after a failure. rigctl ships the trait plus two
//! local implementations: `OfflineOracle` (always "no answer", letting
//! the engine run on knowledge and static fallbacks alone) and
//! `ScriptedOracle` with pre-configured responses for deterministic
//! tests. A live LLM client is wired in by the hosting application.
//!
//! Oracle failures are never fatal to a single tool; the engine treats
//! any error as "no answer" and keeps going.

use async_trait::async_trait;
use rig_common::{HostInfo, ToolCategory};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One tool suggested by the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCandidate {
    pub name: String,
    pub category: ToolCategory,
    #[serde(default)]
    pub description: String,
    pub install_command: String,
    #[serde(default)]
    pub check_command: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Names of tools this one should be installed after
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_priority() -> u8 {
    5
}

impl ToolCandidate {
    pub fn new(name: &str, category: ToolCategory, install_command: &str) -> Self {
        Self {
            name: name.to_string(),
            category,
            description: String::new(),
            install_command: install_command.to_string(),
            check_command: String::new(),
            priority: 5,
            depends_on: Vec::new(),
        }
    }

    pub fn with_check(mut self, check_command: &str) -> Self {
        self.check_command = check_command.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// A proposed stack for a domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackProposal {
    pub tools: Vec<ToolCandidate>,
    pub confidence: f64,
}

/// An alternative command proposed after a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandCandidate {
    pub command: String,
    #[serde(default)]
    pub description: String,
}

/// Context handed to the oracle alongside the domain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleContext {
    pub host: HostInfo,
    /// Success rate over the recent event window, when any history exists
    pub prior_success_rate: Option<f64>,
}

#[async_trait]
pub trait RecommendationOracle: Send + Sync {
    /// Propose a tool stack for a domain. `strict` marks the one allowed
    /// re-prompt after a rejected first answer.
    async fn propose_stack(
        &self,
        domain: &str,
        context: &OracleContext,
        strict: bool,
    ) -> anyhow::Result<StackProposal>;

    /// Propose an alternative command for a failed install. `Ok(None)`
    /// means the oracle has nothing to offer.
    async fn propose_fix(
        &self,
        tool_name: &str,
        failed_command: &str,
        error_text: &str,
    ) -> anyhow::Result<Option<CommandCandidate>>;
}

/// Oracle that never answers. Used when no recommendation backend is
/// wired in; the engine then resolves purely from the knowledge store
/// and static fallback stacks.
#[derive(Debug, Default)]
pub struct OfflineOracle;

#[async_trait]
impl RecommendationOracle for OfflineOracle {
    async fn propose_stack(
        &self,
        _domain: &str,
        _context: &OracleContext,
        _strict: bool,
    ) -> anyhow::Result<StackProposal> {
        anyhow::bail!("no recommendation backend configured")
    }

    async fn propose_fix(
        &self,
        _tool_name: &str,
        _failed_command: &str,
        _error_text: &str,
    ) -> anyhow::Result<Option<CommandCandidate>> {
        Ok(None)
    }
}

/// Scripted oracle for deterministic tests.
///
/// Stack proposals are consumed in order (first call gets the first
/// queued proposal); an empty queue behaves like an unreachable oracle.
/// Fix candidates are matched by tool name and not consumed. Call counts
/// are recorded for assertions.
#[derive(Default)]
pub struct ScriptedOracle {
    stacks: Mutex<Vec<StackProposal>>,
    fixes: Mutex<Vec<(String, CommandCandidate)>>,
    pub stack_calls: AtomicUsize,
    pub fix_calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_stack(self, proposal: StackProposal) -> Self {
        self.stacks.lock().unwrap().push(proposal);
        self
    }

    pub fn fix_for(self, tool_name: &str, candidate: CommandCandidate) -> Self {
        self.fixes
            .lock()
            .unwrap()
            .push((tool_name.to_string(), candidate));
        self
    }

    pub fn stack_call_count(&self) -> usize {
        self.stack_calls.load(Ordering::SeqCst)
    }

    pub fn fix_call_count(&self) -> usize {
        self.fix_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecommendationOracle for ScriptedOracle {
    async fn propose_stack(
        &self,
        _domain: &str,
        _context: &OracleContext,
        _strict: bool,
    ) -> anyhow::Result<StackProposal> {
        self.stack_calls.fetch_add(1, Ordering::SeqCst);
        let mut stacks = self.stacks.lock().unwrap();
        if stacks.is_empty() {
            anyhow::bail!("oracle unreachable")
        }
        Ok(stacks.remove(0))
    }

    async fn propose_fix(
        &self,
        tool_name: &str,
        _failed_command: &str,
        _error_text: &str,
    ) -> anyhow::Result<Option<CommandCandidate>> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        let fixes = self.fixes.lock().unwrap();
        Ok(fixes
            .iter()
            .find(|(name, _)| name == tool_name)
            .map(|(_, candidate)| candidate.clone()))
    }
}
