//! Core entity types for the rig knowledge layer.
//!
//! Everything that the knowledge store persists lives here: tools,
//! relationships, error/fix records, personas and install events.
//! Entities are plain serde structs; the store owns identity rules
//! (name normalization, deduplication).

use crate::error::RigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Normalize a tool name for use as a store key.
///
/// Keys are trimmed and lowercased so "Git", " git" and "git" merge into
/// one entity.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Tool category, used for install-strategy dispatch and coverage checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Editor,
    VersionControl,
    Language,
    Runtime,
    Database,
    Container,
    BuildTool,
    Shell,
    AiMl,
    Other,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Editor => "editor",
            ToolCategory::VersionControl => "version_control",
            ToolCategory::Language => "language",
            ToolCategory::Runtime => "runtime",
            ToolCategory::Database => "database",
            ToolCategory::Container => "container",
            ToolCategory::BuildTool => "build_tool",
            ToolCategory::Shell => "shell",
            ToolCategory::AiMl => "ai_ml",
            ToolCategory::Other => "other",
        }
    }

    /// Parse a category string; anything unknown maps to `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "editor" | "ide" => ToolCategory::Editor,
            "version_control" | "vcs" | "scm" => ToolCategory::VersionControl,
            "language" | "compiler" => ToolCategory::Language,
            "runtime" => ToolCategory::Runtime,
            "database" | "db" => ToolCategory::Database,
            "container" | "containers" | "virtualization" => ToolCategory::Container,
            "build_tool" | "build" => ToolCategory::BuildTool,
            "shell" | "terminal" => ToolCategory::Shell,
            "ai_ml" | "ai" | "ml" | "machine_learning" => ToolCategory::AiMl,
            _ => ToolCategory::Other,
        }
    }
}

/// A tool known to the store.
///
/// Created when first recommended or first logged. Installation attempts
/// never mutate a tool; only knowledge-refresh operations update the
/// description and commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique key (normalized lowercase)
    pub name: String,
    pub category: ToolCategory,
    pub description: String,
    pub install_command: String,
    /// Command that confirms the tool is present (exit 0)
    pub check_command: String,
    /// Installation priority, 1 (lowest) to 10 (highest)
    pub priority: u8,
    /// Recommendation confidence, 0.0 to 1.0
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    pub fn new(name: &str, category: ToolCategory, install_command: &str) -> Self {
        let now = Utc::now();
        Self {
            name: normalize_name(name),
            category,
            description: String::new(),
            install_command: install_command.to_string(),
            check_command: String::new(),
            priority: 5,
            confidence: 0.8,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_check(mut self, check_command: &str) -> Self {
        self.check_command = check_command.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Clamp priority and confidence into their documented ranges.
    pub fn clamped(mut self) -> Self {
        self.priority = self.priority.clamp(1, 10);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// The fixed set of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    DependsOn,
    RequiresOs,
    FixedBy,
    Prefers,
    RelatedTo,
    Includes,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::DependsOn => "DEPENDS_ON",
            RelationKind::RequiresOs => "REQUIRES_OS",
            RelationKind::FixedBy => "FIXED_BY",
            RelationKind::Prefers => "PREFERS",
            RelationKind::RelatedTo => "RELATED_TO",
            RelationKind::Includes => "INCLUDES",
        }
    }

    /// Parse from the wire/storage form. Unknown strings are a hard error;
    /// the relation set is closed.
    pub fn parse(s: &str) -> Result<Self, RigError> {
        match s.trim().to_uppercase().as_str() {
            "DEPENDS_ON" => Ok(RelationKind::DependsOn),
            "REQUIRES_OS" => Ok(RelationKind::RequiresOs),
            "FIXED_BY" => Ok(RelationKind::FixedBy),
            "PREFERS" => Ok(RelationKind::Prefers),
            "RELATED_TO" => Ok(RelationKind::RelatedTo),
            "INCLUDES" => Ok(RelationKind::Includes),
            other => Err(RigError::InvalidRelationshipKind(other.to_string())),
        }
    }
}

/// A directed typed edge between two entities.
///
/// Edges are deduplicated by the full triple; re-asserting one is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub kind: RelationKind,
    pub target: String,
}

/// A recorded error message, optionally tied to a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub message: String,
    pub tool: Option<String>,
    pub root_cause: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(message: &str, tool: Option<&str>) -> Self {
        Self {
            id: format!("err-{}", Uuid::new_v4()),
            message: message.to_string(),
            tool: tool.map(normalize_name),
            root_cause: None,
            recorded_at: Utc::now(),
        }
    }
}

/// A known remedy, reachable from an error via a FIXED_BY edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRecord {
    pub id: String,
    pub description: String,
    pub command: String,
    pub explanation: String,
    pub recorded_at: DateTime<Utc>,
}

impl FixRecord {
    pub fn new(description: &str, command: &str, explanation: &str) -> Self {
        Self {
            id: format!("fix-{}", Uuid::new_v4()),
            description: description.to_string(),
            command: command.to_string(),
            explanation: explanation.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// A user persona with option preferences, linked to tools via PREFERS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub preferences: BTreeMap<String, String>,
}

/// Append-only record of one completed installation attempt.
///
/// One event per tool per run, written at terminal state. Retries are
/// summarized into `attempts`, never logged individually. All success-rate
/// statistics derive from these events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallEvent {
    pub id: String,
    pub tool_name: String,
    pub command_used: String,
    pub success: bool,
    /// Total distinct command attempts consumed before the terminal state
    pub attempts: u32,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub os_type: String,
    pub architecture: String,
    pub error_message: Option<String>,
}

impl InstallEvent {
    pub fn new(tool_name: &str, command_used: &str, success: bool) -> Self {
        Self {
            id: format!("evt-{}", Uuid::new_v4()),
            tool_name: normalize_name(tool_name),
            command_used: command_used.to_string(),
            success,
            attempts: 1,
            duration_ms: 0,
            timestamp: Utc::now(),
            os_type: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            error_message: None,
        }
    }
}

/// Entity kinds addressable by similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tool,
    ErrorRecord,
}

/// A generic reference to a stored entity, produced by graph traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub kind: &'static str,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Git "), "git");
        assert_eq!(normalize_name("Node.js"), "node.js");
    }

    #[test]
    fn test_relation_kind_round_trip() {
        for kind in [
            RelationKind::DependsOn,
            RelationKind::RequiresOs,
            RelationKind::FixedBy,
            RelationKind::Prefers,
            RelationKind::RelatedTo,
            RelationKind::Includes,
        ] {
            assert_eq!(RelationKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_relation_kind_rejects_unknown() {
        let err = RelationKind::parse("USED_WITH").unwrap_err();
        assert!(matches!(err, RigError::InvalidRelationshipKind(_)));
    }

    #[test]
    fn test_category_parse_aliases() {
        assert_eq!(ToolCategory::parse("vcs"), ToolCategory::VersionControl);
        assert_eq!(ToolCategory::parse("IDE"), ToolCategory::Editor);
        assert_eq!(ToolCategory::parse("something-new"), ToolCategory::Other);
    }

    #[test]
    fn test_tool_clamping() {
        let tool = Tool {
            priority: 42,
            confidence: 3.0,
            ..Tool::new("git", ToolCategory::VersionControl, "apt install -y git")
        }
        .clamped();
        assert_eq!(tool.priority, 10);
        assert_eq!(tool.confidence, 1.0);
    }
}
