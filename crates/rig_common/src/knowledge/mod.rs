//! Knowledge store: typed entities, typed relationships, similarity
//! search and install-event statistics.
//!
//! The store is an explicitly constructed component, passed by reference,
//! with no hidden singletons. Internally it runs on one of two backends
//! behind the same contract: SQLite when the database can be opened, a
//! JSON-document fallback otherwise. Callers are never aware of which
//! backend is active; degradation is logged and absorbed.

mod backend;
mod memory;
mod sqlite;

pub mod similarity;
pub mod stats;

use crate::error::{Result, RigError};
use crate::types::{
    EntityKind, EntityRef, ErrorRecord, FixRecord, InstallEvent, Persona, RelationKind,
    Relationship, Tool, ToolCategory, normalize_name,
};
use backend::KnowledgeBackend;
use chrono::{Duration, Utc};
use memory::MemoryBackend;
use similarity::{IndexEntry, SimilarityHit, SimilarityIndex, TextSimilarity, TokenOverlap};
use sqlite::SqliteBackend;
use stats::KnowledgeStatistics;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Knowledge store facade.
pub struct KnowledgeStore {
    backend: Box<dyn KnowledgeBackend>,
    index: Mutex<SimilarityIndex>,
    provider: Box<dyn TextSimilarity>,
}

impl KnowledgeStore {
    /// Open the store under `data_dir`.
    ///
    /// Tries SQLite first, falls back to the JSON document store, and as
    /// a last resort runs purely in memory. This function never fails;
    /// backend unavailability is not the caller's problem.
    pub fn open(data_dir: &Path) -> Self {
        let backend: Box<dyn KnowledgeBackend> =
            match SqliteBackend::open(&data_dir.join("knowledge.db")) {
                Ok(backend) => Box::new(backend),
                Err(e) => {
                    warn!("Knowledge database unavailable, using local store: {:#}", e);
                    match MemoryBackend::open(&data_dir.join("knowledge.json")) {
                        Ok(backend) => Box::new(backend),
                        Err(e) => {
                            warn!("Local store unavailable, running in memory: {:#}", e);
                            Box::new(MemoryBackend::ephemeral())
                        }
                    }
                }
            };
        Self::with_backend(backend)
    }

    /// Purely in-memory store (tests, dry runs).
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::ephemeral()))
    }

    fn with_backend(backend: Box<dyn KnowledgeBackend>) -> Self {
        let corpus = backend.similarity_corpus().unwrap_or_else(|e| {
            warn!("Could not rebuild similarity index: {:#}", e);
            Vec::new()
        });
        debug!(entries = corpus.len(), "similarity index rebuilt");
        Self {
            backend,
            index: Mutex::new(SimilarityIndex::new(corpus)),
            provider: Box::new(TokenOverlap),
        }
    }

    /// Swap the similarity provider (defaults to token overlap).
    pub fn with_provider(mut self, provider: Box<dyn TextSimilarity>) -> Self {
        self.provider = provider;
        self
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Store or merge a tool; returns the canonical stored form.
    pub fn upsert_tool(&self, tool: Tool) -> Result<Tool> {
        let tool = Tool {
            name: normalize_name(&tool.name),
            ..tool
        }
        .clamped();
        let stored = be(self.backend.upsert_tool(&tool))?;
        self.index.lock().unwrap().upsert(IndexEntry {
            kind: EntityKind::Tool,
            key: stored.name.clone(),
            text: format!("{} {}", stored.name, stored.description),
            recorded_at: stored.updated_at,
        });
        Ok(stored)
    }

    pub fn get_tool(&self, name: &str) -> Result<Option<Tool>> {
        be(self.backend.get_tool(&normalize_name(name)))
    }

    pub fn list_tools(&self) -> Result<Vec<Tool>> {
        be(self.backend.list_tools())
    }

    /// Store or merge an error record (merged by exact message text).
    pub fn upsert_error(&self, record: ErrorRecord) -> Result<ErrorRecord> {
        let stored = be(self.backend.upsert_error(&record))?;
        self.index.lock().unwrap().upsert(IndexEntry {
            kind: EntityKind::ErrorRecord,
            key: stored.id.clone(),
            text: stored.message.clone(),
            recorded_at: stored.recorded_at,
        });
        Ok(stored)
    }

    pub fn upsert_persona(&self, persona: Persona) -> Result<()> {
        be(self.backend.upsert_persona(&persona))
    }

    pub fn get_persona(&self, id: &str) -> Result<Option<Persona>> {
        be(self.backend.get_persona(id))
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Assert a typed edge. Idempotent; returns false when the edge
    /// already existed.
    ///
    /// Endpoint rules: tool endpoints and FIXED_BY error sources may be
    /// auto-created; fixes and personas must pre-exist or the call fails
    /// with `DanglingReference`. A FIXED_BY edge whose endpoints exist
    /// with the wrong kinds is rejected.
    pub fn add_relationship(
        &self,
        source: &str,
        kind: RelationKind,
        target: &str,
    ) -> Result<bool> {
        let (source, target) = match kind {
            RelationKind::FixedBy => {
                let source = self.require_error(source)?;
                match be(self.backend.entity_kind(target))? {
                    Some("fix") => {}
                    Some(other) => {
                        return Err(RigError::Validation(format!(
                            "FIXED_BY target must be a fix record, {} is a {}",
                            target, other
                        )))
                    }
                    None => {
                        return Err(RigError::DanglingReference {
                            kind: "fix",
                            name: target.to_string(),
                        })
                    }
                }
                (source, target.to_string())
            }
            RelationKind::Prefers => {
                match be(self.backend.entity_kind(source))? {
                    Some("persona") => {}
                    _ => {
                        return Err(RigError::DanglingReference {
                            kind: "persona",
                            name: source.to_string(),
                        })
                    }
                }
                (source.to_string(), self.ensure_tool(target)?)
            }
            // Tool-to-tool kinds: both endpoints auto-create as tools
            _ => (self.ensure_tool(source)?, self.ensure_tool(target)?),
        };

        be(self.backend.add_edge(&Relationship { source, kind, target }))
    }

    /// Resolve an error endpoint, auto-creating a record when unknown.
    fn require_error(&self, key: &str) -> Result<String> {
        match be(self.backend.entity_kind(key))? {
            Some("error") => Ok(key.to_string()),
            Some(other) => Err(RigError::Validation(format!(
                "FIXED_BY source must be an error record, {} is a {}",
                key, other
            ))),
            None => {
                let record = ErrorRecord {
                    id: key.to_string(),
                    message: key.to_string(),
                    tool: None,
                    root_cause: None,
                    recorded_at: Utc::now(),
                };
                Ok(self.upsert_error(record)?.id)
            }
        }
    }

    /// Resolve a tool endpoint, auto-creating a stub when unknown.
    fn ensure_tool(&self, name: &str) -> Result<String> {
        let name = normalize_name(name);
        if be(self.backend.entity_kind(&name))?.is_none() {
            self.upsert_tool(Tool::new(&name, ToolCategory::Other, ""))?;
        }
        Ok(name)
    }

    /// Entities reachable from `root` within `depth` hops.
    ///
    /// Breadth-first, ties in insertion order, each entity yielded once;
    /// the root itself is not included. The iterator queries the backend
    /// lazily as it expands and cannot be restarted.
    pub fn query_related(
        &self,
        root: &str,
        kind: Option<RelationKind>,
        depth: usize,
    ) -> RelatedIter<'_> {
        let root = normalize_name(root);
        let mut visited = HashSet::new();
        visited.insert(root.clone());
        let mut queue = VecDeque::new();
        if depth > 0 {
            if let Ok(edges) = self.backend.edges_from(&root, kind) {
                for edge in edges {
                    if visited.insert(edge.target.clone()) {
                        queue.push_back((edge.target, 1));
                    }
                }
            }
        }
        RelatedIter {
            store: self,
            kind,
            max_depth: depth,
            queue,
            visited,
        }
    }

    // ------------------------------------------------------------------
    // Fix knowledge
    // ------------------------------------------------------------------

    /// Store an error/fix pair and link them with FIXED_BY.
    ///
    /// This is the only constructor path for fix records, used by the
    /// engine's post-run writeback so future runs can resolve the same
    /// error class without an oracle call.
    pub fn learn_fix(&self, error: ErrorRecord, fix: FixRecord) -> Result<(ErrorRecord, FixRecord)> {
        let error = self.upsert_error(error)?;
        be(self.backend.insert_fix(&fix))?;
        be(self.backend.add_edge(&Relationship {
            source: error.id.clone(),
            kind: RelationKind::FixedBy,
            target: fix.id.clone(),
        }))?;
        debug!(error = %error.message, command = %fix.command, "fix learned");
        Ok((error, fix))
    }

    /// First fix linked to an error record, if any.
    pub fn fix_for_error(&self, error_id: &str) -> Result<Option<FixRecord>> {
        let edges = be(self.backend.edges_from(error_id, Some(RelationKind::FixedBy)))?;
        for edge in edges {
            if let Some(fix) = be(self.backend.get_fix(&edge.target))? {
                return Ok(Some(fix));
            }
        }
        Ok(None)
    }

    /// Best known fix for an error text: similarity search over stored
    /// error records, first hit with a linked fix wins.
    pub fn similar_fix(
        &self,
        error_text: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Option<(SimilarityHit, FixRecord)>> {
        for hit in self.search_similar(error_text, EntityKind::ErrorRecord, top_k, min_score) {
            if let Some(fix) = self.fix_for_error(&hit.key)? {
                return Ok(Some((hit, fix)));
            }
        }
        Ok(None)
    }

    /// Rank stored entities of `kind` against `text`.
    ///
    /// At most `top_k` results, all scoring at least `min_score`; empty
    /// when nothing qualifies. Results are advisory.
    pub fn search_similar(
        &self,
        text: &str,
        kind: EntityKind,
        top_k: usize,
        min_score: f64,
    ) -> Vec<SimilarityHit> {
        self.index
            .lock()
            .unwrap()
            .search(self.provider.as_ref(), text, kind, top_k, min_score)
    }

    // ------------------------------------------------------------------
    // Install events
    // ------------------------------------------------------------------

    /// Append one install event. No synchronous side effects beyond
    /// persistence.
    pub fn record_install_event(&self, event: InstallEvent) -> Result<()> {
        be(self.backend.record_event(&event))
    }

    pub fn recent_events(&self, limit: usize) -> Result<Vec<InstallEvent>> {
        be(self.backend.recent_events(limit))
    }

    /// Aggregate install events over the trailing `window_days`.
    pub fn statistics(&self, window_days: i64) -> Result<KnowledgeStatistics> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let events = be(self.backend.events_since(cutoff))?;
        Ok(stats::aggregate(&events, window_days))
    }
}

/// Lazy breadth-first traversal over typed edges.
pub struct RelatedIter<'a> {
    store: &'a KnowledgeStore,
    kind: Option<RelationKind>,
    max_depth: usize,
    queue: VecDeque<(String, usize)>,
    visited: HashSet<String>,
}

impl Iterator for RelatedIter<'_> {
    type Item = EntityRef;

    fn next(&mut self) -> Option<EntityRef> {
        let (key, depth) = self.queue.pop_front()?;
        if depth < self.max_depth {
            match self.store.backend.edges_from(&key, self.kind) {
                Ok(edges) => {
                    for edge in edges {
                        if self.visited.insert(edge.target.clone()) {
                            self.queue.push_back((edge.target, depth + 1));
                        }
                    }
                }
                Err(e) => warn!("traversal stopped early: {:#}", e),
            }
        }
        let kind = self
            .store
            .backend
            .entity_kind(&key)
            .ok()
            .flatten()
            .unwrap_or("unknown");
        Some(EntityRef { kind, name: key })
    }
}

fn be<T>(result: anyhow::Result<T>) -> Result<T> {
    result.map_err(|e| RigError::KnowledgeBackend(format!("{:#}", e)))
}
