//! Terminal rendering for rigctl.
//!
//! Formatting functions return plain line vectors so they can be tested;
//! color is applied inline via owo-colors.

use crate::engine::report::{RunReport, ToolOutcome};
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use rig_common::knowledge::stats::KnowledgeStatistics;
use rig_common::{EntityRef, InstallEvent};
use std::time::Duration;

/// Spinner shown while a resolution run is in flight.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(message.to_string());
    pb
}

fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Human-readable run report.
pub fn format_report(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "Setup report for \"{}\" on {}",
        report.domain,
        report.host.summary()
    ));
    lines.push(String::new());

    for tool in &report.tools {
        let attempts = if tool.attempts == 1 {
            "1 attempt".to_string()
        } else {
            format!("{} attempts", tool.attempts)
        };
        match tool.outcome {
            ToolOutcome::Succeeded => {
                lines.push(format!(
                    "  {} {:<18} {:<12} {}",
                    "✓".green(),
                    tool.name,
                    attempts,
                    format_duration(tool.duration_ms)
                ));
            }
            ToolOutcome::Failed => {
                lines.push(format!(
                    "  {} {:<18} {:<12} {}",
                    "✗".red(),
                    tool.name.red(),
                    attempts,
                    format_duration(tool.duration_ms)
                ));
                if let Some(error) = &tool.error {
                    let error = error.lines().next().unwrap_or("");
                    lines.push(format!("      last error: {}", error.dimmed()));
                }
            }
            ToolOutcome::Skipped => {
                lines.push(format!("  {} {:<18} cancelled", "-".dimmed(), tool.name.dimmed()));
            }
        }
    }

    lines.push(String::new());
    let attempted = report.tools.len()
        - report
            .tools
            .iter()
            .filter(|t| t.outcome == ToolOutcome::Skipped)
            .count();
    lines.push(format!(
        "{} of {} tools installed ({:.0}% success)",
        report.succeeded(),
        attempted,
        report.success_rate() * 100.0
    ));

    lines
}

/// Install statistics view.
pub fn format_stats(stats: &KnowledgeStatistics) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!("Install statistics (last {} days)", stats.window_days));
    lines.push(format!(
        "  events: {}  succeeded: {}  ({:.0}% success)",
        stats.total_events,
        stats.succeeded,
        stats.success_rate() * 100.0
    ));

    if !stats.tools.is_empty() {
        lines.push(String::new());
        lines.push("  Per tool:".to_string());
        for tool in &stats.tools {
            lines.push(format!(
                "    {:<18} {:>3} events  {:.0}% success",
                tool.name,
                tool.events,
                tool.success_rate() * 100.0
            ));
        }
    }

    if !stats.top_failures.is_empty() {
        lines.push(String::new());
        lines.push("  Most frequent failures:".to_string());
        for (message, count) in stats.top_failures.iter().take(5) {
            let message = message.lines().next().unwrap_or("");
            lines.push(format!("    {:>3}x  {}", count, message));
        }
    }

    if stats.total_events == 0 {
        lines.push("  No install events recorded yet.".to_string());
    }

    lines
}

/// Relationship traversal view.
pub fn format_related(root: &str, related: &[EntityRef]) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("Entities related to {}:", root));
    if related.is_empty() {
        lines.push("  none known yet".to_string());
        return lines;
    }
    for entity in related {
        lines.push(format!("  {}  [{}]", entity.name, entity.kind));
    }
    lines
}

/// Recent install event view.
pub fn format_history(events: &[InstallEvent]) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("Recent install events:".to_string());
    if events.is_empty() {
        lines.push("  none recorded yet".to_string());
        return lines;
    }
    for event in events {
        let mark = if event.success {
            format!("{}", "✓".green())
        } else {
            format!("{}", "✗".red())
        };
        lines.push(format!(
            "  {}  {} {:<18} {} attempt(s)  {}",
            event.timestamp.format("%Y-%m-%d %H:%M"),
            mark,
            event.tool_name,
            event.attempts,
            event.command_used
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::report::ToolReport;
    use chrono::Utc;
    use rig_common::HostInfo;

    #[test]
    fn test_report_lines_mention_every_tool() {
        let report = RunReport {
            run_id: "run-test".to_string(),
            domain: "web dev".to_string(),
            host: HostInfo::detect(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            tools: vec![
                ToolReport {
                    name: "git".to_string(),
                    outcome: ToolOutcome::Succeeded,
                    command: "apt install git".to_string(),
                    attempts: 1,
                    duration_ms: 900,
                    error: None,
                },
                ToolReport {
                    name: "weird-tool".to_string(),
                    outcome: ToolOutcome::Failed,
                    command: "bad-cmd".to_string(),
                    attempts: 3,
                    duration_ms: 2100,
                    error: Some("no such package".to_string()),
                },
            ],
        };
        let lines = format_report(&report);
        let text = lines.join("\n");
        assert!(text.contains("git"));
        assert!(text.contains("weird-tool"));
        assert!(text.contains("3 attempts"));
        assert!(text.contains("1 of 2 tools installed"));
        assert!(text.contains("no such package"));
    }

    #[test]
    fn test_empty_history() {
        let lines = format_history(&[]);
        assert!(lines.iter().any(|l| l.contains("none recorded")));
    }

    #[test]
    fn test_related_view() {
        let related = vec![EntityRef {
            kind: "tool",
            name: "curl".to_string(),
        }];
        let lines = format_related("docker", &related);
        assert!(lines.iter().any(|l| l.contains("curl")));
    }
}
