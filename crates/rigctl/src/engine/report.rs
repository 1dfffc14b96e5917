//! Run report.
//!
//! The structured output of a resolution run: one terminal state per
//! tool, suitable for human display or machine consumption.

use chrono::{DateTime, Utc};
use rig_common::HostInfo;
use serde::{Deserialize, Serialize};

/// Terminal state of one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Succeeded,
    Failed,
    /// Never attempted (run cancelled before its turn)
    Skipped,
}

/// Per-tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReport {
    pub name: String,
    pub outcome: ToolOutcome,
    /// Last command attempted
    pub command: String,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Complete report of one resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub domain: String,
    pub host: HostInfo,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tools: Vec<ToolReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.tools
            .iter()
            .filter(|t| t.outcome == ToolOutcome::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.tools
            .iter()
            .filter(|t| t.outcome == ToolOutcome::Failed)
            .count()
    }

    /// Fraction of attempted tools that succeeded.
    pub fn success_rate(&self) -> f64 {
        let attempted = self
            .tools
            .iter()
            .filter(|t| t.outcome != ToolOutcome::Skipped)
            .count();
        if attempted == 0 {
            0.0
        } else {
            self.succeeded() as f64 / attempted as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: &[ToolOutcome]) -> RunReport {
        RunReport {
            run_id: "run-test".to_string(),
            domain: "test".to_string(),
            host: HostInfo::detect(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            tools: outcomes
                .iter()
                .enumerate()
                .map(|(i, outcome)| ToolReport {
                    name: format!("tool{}", i),
                    outcome: *outcome,
                    command: "true".to_string(),
                    attempts: 1,
                    duration_ms: 10,
                    error: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_success_rate() {
        let r = report(&[
            ToolOutcome::Succeeded,
            ToolOutcome::Succeeded,
            ToolOutcome::Failed,
            ToolOutcome::Skipped,
        ]);
        assert_eq!(r.succeeded(), 2);
        assert_eq!(r.failed(), 1);
        assert!((r.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_report_rate_is_zero() {
        let r = report(&[]);
        assert_eq!(r.success_rate(), 0.0);
    }
}
