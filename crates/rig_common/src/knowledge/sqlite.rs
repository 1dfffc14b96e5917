//! SQLite backend for the knowledge store.
//!
//! Location: ~/.local/share/rig/knowledge.db (overridable via config).
//! Schema init is idempotent; unique constraints carry the idempotence
//! guarantees (tool name, relationship triple, error message).

use super::backend::KnowledgeBackend;
use super::similarity::IndexEntry;
use crate::types::{
    EntityKind, ErrorRecord, FixRecord, InstallEvent, Persona, RelationKind, Relationship, Tool,
    ToolCategory,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open or create the database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tools (
                name TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                install_command TEXT NOT NULL,
                check_command TEXT NOT NULL,
                priority INTEGER NOT NULL,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS error_records (
                id TEXT PRIMARY KEY,
                message TEXT NOT NULL UNIQUE,
                tool TEXT,
                root_cause TEXT,
                recorded_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS fix_records (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                command TEXT NOT NULL,
                explanation TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS personas (
                id TEXT PRIMARY KEY,
                preferences TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS relationships (
                source TEXT NOT NULL,
                kind TEXT NOT NULL,
                target TEXT NOT NULL,
                UNIQUE(source, kind, target)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS install_events (
                id TEXT PRIMARY KEY,
                tool_name TEXT NOT NULL,
                command_used TEXT NOT NULL,
                success INTEGER NOT NULL,
                attempts INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                os_type TEXT NOT NULL,
                architecture TEXT NOT NULL,
                error_message TEXT
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON install_events(timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_tool ON install_events(tool_name)",
            [],
        )?;

        Ok(())
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn tool_from_row(row: &Row<'_>) -> rusqlite::Result<Tool> {
    Ok(Tool {
        name: row.get(0)?,
        category: ToolCategory::parse(&row.get::<_, String>(1)?),
        description: row.get(2)?,
        install_command: row.get(3)?,
        check_command: row.get(4)?,
        priority: row.get::<_, i64>(5)? as u8,
        confidence: row.get(6)?,
        created_at: parse_ts(&row.get::<_, String>(7)?),
        updated_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

fn error_from_row(row: &Row<'_>) -> rusqlite::Result<ErrorRecord> {
    Ok(ErrorRecord {
        id: row.get(0)?,
        message: row.get(1)?,
        tool: row.get(2)?,
        root_cause: row.get(3)?,
        recorded_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<InstallEvent> {
    Ok(InstallEvent {
        id: row.get(0)?,
        tool_name: row.get(1)?,
        command_used: row.get(2)?,
        success: row.get::<_, i64>(3)? != 0,
        attempts: row.get::<_, i64>(4)? as u32,
        duration_ms: row.get::<_, i64>(5)? as u64,
        timestamp: parse_ts(&row.get::<_, String>(6)?),
        os_type: row.get(7)?,
        architecture: row.get(8)?,
        error_message: row.get(9)?,
    })
}

impl KnowledgeBackend for SqliteBackend {
    fn upsert_tool(&self, tool: &Tool) -> Result<Tool> {
        let conn = self.conn.lock().unwrap();

        let existing: Option<String> = conn
            .query_row(
                "SELECT created_at FROM tools WHERE name = ?",
                params![&tool.name],
                |row| row.get(0),
            )
            .optional()?;

        let created_at = existing
            .as_deref()
            .map(parse_ts)
            .unwrap_or(tool.created_at);

        conn.execute(
            r#"
            INSERT INTO tools (name, category, description, install_command, check_command,
                               priority, confidence, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                category = excluded.category,
                description = excluded.description,
                install_command = excluded.install_command,
                check_command = excluded.check_command,
                priority = excluded.priority,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            "#,
            params![
                &tool.name,
                tool.category.as_str(),
                &tool.description,
                &tool.install_command,
                &tool.check_command,
                tool.priority as i64,
                tool.confidence,
                created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        drop(conn);
        self.get_tool(&tool.name)?
            .context("tool missing after upsert")
    }

    fn get_tool(&self, name: &str) -> Result<Option<Tool>> {
        let conn = self.conn.lock().unwrap();
        let tool = conn
            .query_row(
                r#"
                SELECT name, category, description, install_command, check_command,
                       priority, confidence, created_at, updated_at
                FROM tools WHERE name = ?
                "#,
                params![name],
                tool_from_row,
            )
            .optional()?;
        Ok(tool)
    }

    fn list_tools(&self) -> Result<Vec<Tool>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT name, category, description, install_command, check_command,
                   priority, confidence, created_at, updated_at
            FROM tools ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map([], tool_from_row)?;
        let mut tools = Vec::new();
        for row in rows {
            tools.push(row?);
        }
        Ok(tools)
    }

    fn upsert_error(&self, record: &ErrorRecord) -> Result<ErrorRecord> {
        let conn = self.conn.lock().unwrap();

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM error_records WHERE message = ?",
                params![&record.message],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    r#"
                    UPDATE error_records SET
                        tool = COALESCE(?, tool),
                        root_cause = COALESCE(?, root_cause)
                    WHERE id = ?
                    "#,
                    params![&record.tool, &record.root_cause, &id],
                )?;
                drop(conn);
                self.get_error(&id)?.context("error missing after update")
            }
            None => {
                conn.execute(
                    r#"
                    INSERT INTO error_records (id, message, tool, root_cause, recorded_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                    params![
                        &record.id,
                        &record.message,
                        &record.tool,
                        &record.root_cause,
                        record.recorded_at.to_rfc3339(),
                    ],
                )?;
                Ok(record.clone())
            }
        }
    }

    fn get_error(&self, id: &str) -> Result<Option<ErrorRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, message, tool, root_cause, recorded_at FROM error_records WHERE id = ?",
                params![id],
                error_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_fix(&self, fix: &FixRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO fix_records (id, description, command, explanation, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                &fix.id,
                &fix.description,
                &fix.command,
                &fix.explanation,
                fix.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_fix(&self, id: &str) -> Result<Option<FixRecord>> {
        let conn = self.conn.lock().unwrap();
        let fix = conn
            .query_row(
                "SELECT id, description, command, explanation, recorded_at FROM fix_records WHERE id = ?",
                params![id],
                |row| {
                    Ok(FixRecord {
                        id: row.get(0)?,
                        description: row.get(1)?,
                        command: row.get(2)?,
                        explanation: row.get(3)?,
                        recorded_at: parse_ts(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(fix)
    }

    fn upsert_persona(&self, persona: &Persona) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO personas (id, preferences) VALUES (?, ?)",
            params![&persona.id, serde_json::to_string(&persona.preferences)?],
        )?;
        Ok(())
    }

    fn get_persona(&self, id: &str) -> Result<Option<Persona>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT id, preferences FROM personas WHERE id = ?",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((id, prefs)) => Ok(Some(Persona {
                id,
                preferences: serde_json::from_str(&prefs)?,
            })),
            None => Ok(None),
        }
    }

    fn entity_kind(&self, key: &str) -> Result<Option<&'static str>> {
        let conn = self.conn.lock().unwrap();
        let checks: [(&str, &'static str); 4] = [
            ("SELECT 1 FROM tools WHERE name = ?", "tool"),
            ("SELECT 1 FROM error_records WHERE id = ?", "error"),
            ("SELECT 1 FROM fix_records WHERE id = ?", "fix"),
            ("SELECT 1 FROM personas WHERE id = ?", "persona"),
        ];
        for (sql, kind) in checks {
            let hit: Option<i64> = conn.query_row(sql, params![key], |row| row.get(0)).optional()?;
            if hit.is_some() {
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }

    fn add_edge(&self, rel: &Relationship) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO relationships (source, kind, target) VALUES (?, ?, ?)",
            params![&rel.source, rel.kind.as_str(), &rel.target],
        )?;
        Ok(inserted > 0)
    }

    fn edges_from(&self, source: &str, kind: Option<RelationKind>) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap();
        let mut edges = Vec::new();
        match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(
                    "SELECT source, kind, target FROM relationships WHERE source = ? AND kind = ? ORDER BY rowid",
                )?;
                let rows = stmt.query_map(params![source, kind.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })?;
                for row in rows {
                    let (source, kind_raw, target) = row?;
                    if let Ok(kind) = RelationKind::parse(&kind_raw) {
                        edges.push(Relationship { source, kind, target });
                    }
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT source, kind, target FROM relationships WHERE source = ? ORDER BY rowid",
                )?;
                let rows = stmt.query_map(params![source], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })?;
                for row in rows {
                    let (source, kind_raw, target) = row?;
                    if let Ok(kind) = RelationKind::parse(&kind_raw) {
                        edges.push(Relationship { source, kind, target });
                    }
                }
            }
        }
        Ok(edges)
    }

    fn record_event(&self, event: &InstallEvent) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO install_events
                (id, tool_name, command_used, success, attempts, duration_ms,
                 timestamp, os_type, architecture, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &event.id,
                &event.tool_name,
                &event.command_used,
                event.success as i64,
                event.attempts as i64,
                event.duration_ms as i64,
                event.timestamp.to_rfc3339(),
                &event.os_type,
                &event.architecture,
                &event.error_message,
            ],
        )?;
        Ok(())
    }

    fn events_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<InstallEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, tool_name, command_used, success, attempts, duration_ms,
                   timestamp, os_type, architecture, error_message
            FROM install_events WHERE timestamp >= ? ORDER BY timestamp
            "#,
        )?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<InstallEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, tool_name, command_used, success, attempts, duration_ms,
                   timestamp, os_type, architecture, error_message
            FROM install_events ORDER BY timestamp DESC LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn similarity_corpus(&self) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        for tool in self.list_tools()? {
            entries.push(IndexEntry {
                kind: EntityKind::Tool,
                key: tool.name.clone(),
                text: format!("{} {}", tool.name, tool.description),
                recorded_at: tool.updated_at,
            });
        }
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, message, tool, root_cause, recorded_at FROM error_records ORDER BY rowid")?;
        let rows = stmt.query_map([], error_from_row)?;
        for row in rows {
            let record = row?;
            entries.push(IndexEntry {
                kind: EntityKind::ErrorRecord,
                key: record.id,
                text: record.message,
                recorded_at: record.recorded_at,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_backend() -> (SqliteBackend, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let backend = SqliteBackend::open(&dir.path().join("knowledge.db")).unwrap();
        (backend, dir)
    }

    #[test]
    fn test_upsert_tool_merges() {
        let (backend, _dir) = test_backend();

        let first = Tool::new("Git", ToolCategory::VersionControl, "apt install -y git");
        backend.upsert_tool(&first).unwrap();

        let mut second = first.clone();
        second.description = "distributed version control".to_string();
        backend.upsert_tool(&second).unwrap();

        let tools = backend.list_tools().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "distributed version control");
    }

    #[test]
    fn test_edge_dedup() {
        let (backend, _dir) = test_backend();
        let rel = Relationship {
            source: "docker".to_string(),
            kind: RelationKind::DependsOn,
            target: "curl".to_string(),
        };
        assert!(backend.add_edge(&rel).unwrap());
        assert!(!backend.add_edge(&rel).unwrap());
        assert_eq!(backend.edges_from("docker", None).unwrap().len(), 1);
    }

    #[test]
    fn test_error_dedup_by_message() {
        let (backend, _dir) = test_backend();
        let a = backend
            .upsert_error(&ErrorRecord::new("permission denied", None))
            .unwrap();
        let b = backend
            .upsert_error(&ErrorRecord::new("permission denied", Some("git")))
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.tool.as_deref(), Some("git"));
    }

    #[test]
    fn test_events_round_trip() {
        let (backend, _dir) = test_backend();
        let mut event = InstallEvent::new("git", "apt install -y git", true);
        event.attempts = 2;
        backend.record_event(&event).unwrap();

        let events = backend.recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attempts, 2);
        assert!(events[0].success);
    }

    #[test]
    fn test_similarity_corpus_covers_tools_and_errors() {
        let (backend, _dir) = test_backend();
        backend
            .upsert_tool(&Tool::new("git", ToolCategory::VersionControl, "apt install -y git"))
            .unwrap();
        backend
            .upsert_error(&ErrorRecord::new("network unreachable", None))
            .unwrap();

        let corpus = backend.similarity_corpus().unwrap();
        assert_eq!(corpus.len(), 2);
        assert!(corpus.iter().any(|e| e.kind == EntityKind::Tool));
        assert!(corpus.iter().any(|e| e.kind == EntityKind::ErrorRecord));
    }
}
