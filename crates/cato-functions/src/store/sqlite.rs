use crate::error::{StoreError, StoreResult};
use crate::kv::{KvStore, Namespace};
use crate::project::{new_public_id, ProjectId, ProjectRecord, ProjectStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_uid TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS files (
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  filepath TEXT NOT NULL,
  content BLOB NOT NULL,
  PRIMARY KEY (project_id, filepath)
);

CREATE TABLE IF NOT EXISTS kv_store (
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  key_name TEXT NOT NULL,
  value TEXT NOT NULL,
  PRIMARY KEY (project_id, key_name)
);
"#;

/// SQLite backend
///
/// One connection behind a mutex, so every statement is serialized and a
/// single `set` is atomic.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Self::with_connection(conn)
    }

    /// Private database that disappears with the store
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRecord> {
    Ok(ProjectRecord::new(
        ProjectId::new(row.get(0)?),
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
    ))
}

impl ProjectStore for SqliteStore {
    fn create_project(&self, name: &str) -> StoreResult<ProjectRecord> {
        let conn = self.conn()?;
        let public_id = new_public_id();
        conn.execute(
            "INSERT INTO projects (project_uid, name) VALUES (?1, ?2)",
            params![public_id, name],
        )?;
        let id = ProjectId::new(conn.last_insert_rowid());
        tracing::info!(project = %id, public_id = %public_id, "project created");
        Ok(ProjectRecord::new(id, public_id, name))
    }

    fn resolve(&self, public_id: &str) -> StoreResult<Option<ProjectRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, project_uid, name FROM projects WHERE project_uid = ?1",
                params![public_id],
                project_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list_projects(&self) -> StoreResult<Vec<ProjectRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, project_uid, name FROM projects ORDER BY id")?;
        let rows = stmt.query_map([], project_from_row)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    fn put_file(&self, project: &ProjectRecord, path: &str, content: &[u8]) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (project_id, filepath, content) VALUES (?1, ?2, ?3)
             ON CONFLICT(project_id, filepath) DO UPDATE SET content = excluded.content",
            params![project.id().get(), path, content],
        )?;
        tracing::debug!(project = %project.id(), path, bytes = content.len(), "file stored");
        Ok(())
    }

    fn get_file(&self, project: &ProjectRecord, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let content = conn
            .query_row(
                "SELECT content FROM files WHERE project_id = ?1 AND filepath = ?2",
                params![project.id().get(), path],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(content)
    }

    fn delete_project(&self, project: &ProjectRecord) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id = project.id().get();
        tx.execute("DELETE FROM kv_store WHERE project_id = ?1", params![id])?;
        tx.execute("DELETE FROM files WHERE project_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        tx.commit()?;
        if removed > 0 {
            tracing::info!(project = %project.id(), "project deleted");
        }
        Ok(removed > 0)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, ns: Namespace, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE project_id = ?1 AND key_name = ?2",
                params![ns.project_id().get(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, ns: Namespace, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv_store (project_id, key_name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(project_id, key_name) DO UPDATE SET value = excluded.value",
            params![ns.project_id().get(), key, value],
        )?;
        Ok(())
    }

    fn delete(&self, ns: Namespace, key: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE project_id = ?1 AND key_name = ?2",
            params![ns.project_id().get(), key],
        )?;
        Ok(removed > 0)
    }

    fn list(&self, ns: Namespace) -> StoreResult<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key_name, value FROM kv_store WHERE project_id = ?1 ORDER BY key_name",
        )?;
        let rows = stmt.query_map(params![ns.project_id().get()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn clear(&self, ns: Namespace) -> StoreResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE project_id = ?1",
            params![ns.project_id().get()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_upsert_keeps_one_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let project = store.create_project("demo").unwrap();
        let ns = Namespace::from(&project);

        store.set(ns, "visits", "1").unwrap();
        store.set(ns, "visits", "2").unwrap();

        assert_eq!(store.get(ns, "visits").unwrap(), Some("2".to_string()));
        assert_eq!(store.list(ns).unwrap().len(), 1);
    }

    #[test]
    fn test_file_round_trip_is_binary_safe() {
        let store = SqliteStore::open_in_memory().unwrap();
        let project = store.create_project("demo").unwrap();
        let bytes = vec![0u8, 159, 146, 150];

        store.put_file(&project, "blob.bin", &bytes).unwrap();
        assert_eq!(store.get_file(&project, "blob.bin").unwrap(), Some(bytes));
        assert_eq!(store.get_file(&project, "other").unwrap(), None);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cato.db");
        let store = SqliteStore::open(&path).unwrap();
        store.create_project("demo").unwrap();
        assert!(path.exists());
    }
}
