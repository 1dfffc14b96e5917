//! Install-event statistics.
//!
//! Everything here is derived from the append-only event log at query
//! time; nothing is stored redundantly. Failure messages are grouped by
//! exact string match, not similarity.

use crate::types::InstallEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-tool aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStats {
    pub name: String,
    pub events: u64,
    pub succeeded: u64,
}

impl ToolStats {
    pub fn success_rate(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.events as f64
        }
    }
}

/// Aggregated statistics over a time window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStatistics {
    pub window_days: i64,
    pub total_events: u64,
    pub succeeded: u64,
    /// Per-tool aggregates, most events first, ties by name
    pub tools: Vec<ToolStats>,
    /// Failure messages by frequency (exact string grouping), most
    /// frequent first, ties by message
    pub top_failures: Vec<(String, u64)>,
}

impl KnowledgeStatistics {
    pub fn success_rate(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total_events as f64
        }
    }
}

/// Aggregate a window of install events.
pub fn aggregate(events: &[InstallEvent], window_days: i64) -> KnowledgeStatistics {
    let mut per_tool: HashMap<String, ToolStats> = HashMap::new();
    let mut failures: HashMap<String, u64> = HashMap::new();
    let mut succeeded = 0u64;

    for event in events {
        let stats = per_tool
            .entry(event.tool_name.clone())
            .or_insert_with(|| ToolStats {
                name: event.tool_name.clone(),
                events: 0,
                succeeded: 0,
            });
        stats.events += 1;
        if event.success {
            stats.succeeded += 1;
            succeeded += 1;
        } else if let Some(message) = &event.error_message {
            *failures.entry(message.clone()).or_insert(0) += 1;
        }
    }

    let mut tools: Vec<ToolStats> = per_tool.into_values().collect();
    tools.sort_by(|a, b| b.events.cmp(&a.events).then_with(|| a.name.cmp(&b.name)));

    let mut top_failures: Vec<(String, u64)> = failures.into_iter().collect();
    top_failures.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    KnowledgeStatistics {
        window_days,
        total_events: events.len() as u64,
        succeeded,
        tools,
        top_failures,
    }
}
