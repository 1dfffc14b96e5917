//! Backend contract shared by the SQLite store and the local fallback.
//!
//! Every operation's success/failure behavior must be identical across
//! backends; the facade in `mod.rs` is the only caller and never lets a
//! backend detail escape.

use super::similarity::IndexEntry;
use crate::types::{
    ErrorRecord, FixRecord, InstallEvent, Persona, RelationKind, Relationship, Tool,
};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub(crate) trait KnowledgeBackend: Send + Sync {
    fn upsert_tool(&self, tool: &Tool) -> Result<Tool>;
    fn get_tool(&self, name: &str) -> Result<Option<Tool>>;
    fn list_tools(&self) -> Result<Vec<Tool>>;

    /// Merge by exact message text; a re-observed message keeps its id.
    fn upsert_error(&self, record: &ErrorRecord) -> Result<ErrorRecord>;
    fn get_error(&self, id: &str) -> Result<Option<ErrorRecord>>;

    fn insert_fix(&self, fix: &FixRecord) -> Result<()>;
    fn get_fix(&self, id: &str) -> Result<Option<FixRecord>>;

    fn upsert_persona(&self, persona: &Persona) -> Result<()>;
    fn get_persona(&self, id: &str) -> Result<Option<Persona>>;

    /// Kind of the entity stored under `key`, if any ("tool", "error",
    /// "fix", "persona").
    fn entity_kind(&self, key: &str) -> Result<Option<&'static str>>;

    /// Returns false when the triple already existed.
    fn add_edge(&self, rel: &Relationship) -> Result<bool>;
    /// Outgoing edges in insertion order.
    fn edges_from(&self, source: &str, kind: Option<RelationKind>) -> Result<Vec<Relationship>>;

    fn record_event(&self, event: &InstallEvent) -> Result<()>;
    fn events_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<InstallEvent>>;
    fn recent_events(&self, limit: usize) -> Result<Vec<InstallEvent>>;

    /// All indexable texts, for rebuilding the similarity index at open.
    fn similarity_corpus(&self) -> Result<Vec<IndexEntry>>;
}
