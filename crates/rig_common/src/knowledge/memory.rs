//! Local fallback backend.
//!
//! In-process document store used when SQLite cannot be opened. Holds the
//! same entities with the same contract, persisted as a single JSON
//! document via atomic write (temp file + rename) so the file is never in
//! a partial state. With no path configured it is purely in-memory, which
//! is what tests use.

use super::backend::KnowledgeBackend;
use super::similarity::IndexEntry;
use crate::types::{
    EntityKind, ErrorRecord, FixRecord, InstallEvent, Persona, RelationKind, Relationship, Tool,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The persisted document. Vectors preserve insertion order, which is the
/// order relationship traversal and the similarity corpus rely on.
#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryDoc {
    tools: Vec<Tool>,
    errors: Vec<ErrorRecord>,
    fixes: Vec<FixRecord>,
    personas: Vec<Persona>,
    relationships: Vec<Relationship>,
    events: Vec<InstallEvent>,
}

pub struct MemoryBackend {
    doc: Mutex<MemoryDoc>,
    path: Option<PathBuf>,
}

impl MemoryBackend {
    /// Purely in-memory store, nothing persisted.
    pub fn ephemeral() -> Self {
        Self {
            doc: Mutex::new(MemoryDoc::default()),
            path: None,
        }
    }

    /// Open the JSON-backed store, loading an existing document if present.
    pub fn open(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read store: {}", path.display()))?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            MemoryDoc::default()
        };
        let backend = Self {
            doc: Mutex::new(doc),
            path: Some(path.to_path_buf()),
        };
        // An unwritable path must fail here, not on the first upsert
        {
            let doc = backend.doc.lock().unwrap();
            backend.persist(&doc)?;
        }
        Ok(backend)
    }

    fn persist(&self, doc: &MemoryDoc) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(doc)?;
        atomic_write(path, json.as_bytes())
            .with_context(|| format!("Failed to write store: {}", path.display()))
    }
}

/// Write data to a file atomically using temp file + rename.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

impl KnowledgeBackend for MemoryBackend {
    fn upsert_tool(&self, tool: &Tool) -> Result<Tool> {
        let mut doc = self.doc.lock().unwrap();
        let stored = match doc.tools.iter_mut().find(|t| t.name == tool.name) {
            Some(existing) => {
                existing.category = tool.category;
                existing.description = tool.description.clone();
                existing.install_command = tool.install_command.clone();
                existing.check_command = tool.check_command.clone();
                existing.priority = tool.priority;
                existing.confidence = tool.confidence;
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                doc.tools.push(tool.clone());
                tool.clone()
            }
        };
        self.persist(&doc)?;
        Ok(stored)
    }

    fn get_tool(&self, name: &str) -> Result<Option<Tool>> {
        let doc = self.doc.lock().unwrap();
        Ok(doc.tools.iter().find(|t| t.name == name).cloned())
    }

    fn list_tools(&self) -> Result<Vec<Tool>> {
        Ok(self.doc.lock().unwrap().tools.clone())
    }

    fn upsert_error(&self, record: &ErrorRecord) -> Result<ErrorRecord> {
        let mut doc = self.doc.lock().unwrap();
        let stored = match doc.errors.iter_mut().find(|e| e.message == record.message) {
            Some(existing) => {
                if record.tool.is_some() {
                    existing.tool = record.tool.clone();
                }
                if record.root_cause.is_some() {
                    existing.root_cause = record.root_cause.clone();
                }
                existing.clone()
            }
            None => {
                doc.errors.push(record.clone());
                record.clone()
            }
        };
        self.persist(&doc)?;
        Ok(stored)
    }

    fn get_error(&self, id: &str) -> Result<Option<ErrorRecord>> {
        let doc = self.doc.lock().unwrap();
        Ok(doc.errors.iter().find(|e| e.id == id).cloned())
    }

    fn insert_fix(&self, fix: &FixRecord) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        if let Some(existing) = doc.fixes.iter_mut().find(|f| f.id == fix.id) {
            *existing = fix.clone();
        } else {
            doc.fixes.push(fix.clone());
        }
        self.persist(&doc)
    }

    fn get_fix(&self, id: &str) -> Result<Option<FixRecord>> {
        let doc = self.doc.lock().unwrap();
        Ok(doc.fixes.iter().find(|f| f.id == id).cloned())
    }

    fn upsert_persona(&self, persona: &Persona) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        if let Some(existing) = doc.personas.iter_mut().find(|p| p.id == persona.id) {
            *existing = persona.clone();
        } else {
            doc.personas.push(persona.clone());
        }
        self.persist(&doc)
    }

    fn get_persona(&self, id: &str) -> Result<Option<Persona>> {
        let doc = self.doc.lock().unwrap();
        Ok(doc.personas.iter().find(|p| p.id == id).cloned())
    }

    fn entity_kind(&self, key: &str) -> Result<Option<&'static str>> {
        let doc = self.doc.lock().unwrap();
        if doc.tools.iter().any(|t| t.name == key) {
            return Ok(Some("tool"));
        }
        if doc.errors.iter().any(|e| e.id == key) {
            return Ok(Some("error"));
        }
        if doc.fixes.iter().any(|f| f.id == key) {
            return Ok(Some("fix"));
        }
        if doc.personas.iter().any(|p| p.id == key) {
            return Ok(Some("persona"));
        }
        Ok(None)
    }

    fn add_edge(&self, rel: &Relationship) -> Result<bool> {
        let mut doc = self.doc.lock().unwrap();
        if doc.relationships.iter().any(|r| r == rel) {
            return Ok(false);
        }
        doc.relationships.push(rel.clone());
        self.persist(&doc)?;
        Ok(true)
    }

    fn edges_from(&self, source: &str, kind: Option<RelationKind>) -> Result<Vec<Relationship>> {
        let doc = self.doc.lock().unwrap();
        Ok(doc
            .relationships
            .iter()
            .filter(|r| r.source == source && kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect())
    }

    fn record_event(&self, event: &InstallEvent) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        doc.events.push(event.clone());
        self.persist(&doc)
    }

    fn events_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<InstallEvent>> {
        let doc = self.doc.lock().unwrap();
        Ok(doc
            .events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect())
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<InstallEvent>> {
        let doc = self.doc.lock().unwrap();
        let mut events: Vec<InstallEvent> = doc.events.clone();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }

    fn similarity_corpus(&self) -> Result<Vec<IndexEntry>> {
        let doc = self.doc.lock().unwrap();
        let mut entries = Vec::new();
        for tool in &doc.tools {
            entries.push(IndexEntry {
                kind: EntityKind::Tool,
                key: tool.name.clone(),
                text: format!("{} {}", tool.name, tool.description),
                recorded_at: tool.updated_at,
            });
        }
        for record in &doc.errors {
            entries.push(IndexEntry {
                kind: EntityKind::ErrorRecord,
                key: record.id.clone(),
                text: record.message.clone(),
                recorded_at: record.recorded_at,
            });
        }
        Ok(entries)
    }
}
