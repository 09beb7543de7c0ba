//! Session persistence with `SQLite`.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite uses i64

use super::Session;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const SCHEMA_VERSION: i32 = 2;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Equality filter over the indexed session columns. `None` matches anything.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub is_active: Option<bool>,
}

impl SessionFilter {
    /// Active sessions of one user.
    pub fn active_for(user_id: &str) -> Self {
        Self {
            id: None,
            user_id: Some(user_id.to_string()),
            is_active: Some(true),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// WHERE clause and its parameters.
    fn to_sql(&self) -> (String, Vec<rusqlite::types::Value>) {
        use rusqlite::types::Value;

        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(id) = &self.id {
            values.push(Value::Text(id.clone()));
            clauses.push(format!("id = ?{}", values.len()));
        }
        if let Some(user_id) = &self.user_id {
            values.push(Value::Text(user_id.clone()));
            clauses.push(format!("user_id = ?{}", values.len()));
        }
        if let Some(is_active) = self.is_active {
            values.push(Value::Integer(i64::from(is_active)));
            clauses.push(format!("is_active = ?{}", values.len()));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Record store for sessions. `save` replaces the whole document: the last
/// writer wins.
pub trait SessionRepository: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<Session>, SessionStoreError>;

    fn find_one(&self, filter: &SessionFilter) -> Result<Option<Session>, SessionStoreError>;

    /// Most recently updated first.
    fn find_many(&self, filter: &SessionFilter, limit: usize) -> Result<Vec<Session>, SessionStoreError>;

    fn save(&self, session: &Session) -> Result<(), SessionStoreError>;

    fn count(&self, filter: &SessionFilter) -> Result<usize, SessionStoreError>;
}

pub struct SessionStore {
    db: Mutex<Connection>,
}

impl SessionStore {
    /// Open or create a session store at the given path.
    pub fn open(path: &Path) -> Result<Self, SessionStoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionStoreError::InvalidData(format!(
                    "Failed to create session directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = Connection::open(path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self, SessionStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self, SessionStoreError> {
        let store = Self { db: Mutex::new(db) };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SessionStoreError> {
        self.db
            .lock()
            .map_err(|_| SessionStoreError::InvalidData("session store lock poisoned".into()))
    }

    fn init_schema(&self) -> Result<(), SessionStoreError> {
        let db = self.lock()?;
        let version: i32 = db.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        // Migration v0 -> v1: Initial schema
        if version < 1 {
            db.execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS sessions (
                    id          TEXT PRIMARY KEY,
                    user_id     TEXT NOT NULL,
                    is_active   INTEGER NOT NULL,
                    document    TEXT NOT NULL,
                    created_at  INTEGER NOT NULL,
                    updated_at  INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user_active
                    ON sessions(user_id, is_active, updated_at DESC);

                PRAGMA user_version = 1;
                ",
            )?;
        }

        // Migration v1 -> v2: Denormalized title for listings
        if version < SCHEMA_VERSION {
            db.execute_batch(
                r"
                ALTER TABLE sessions ADD COLUMN title TEXT NOT NULL DEFAULT '';
                UPDATE sessions SET title = COALESCE(json_extract(document, '$.title'), '');

                PRAGMA user_version = 2;
                ",
            )?;
        }

        Ok(())
    }

    /// Titles of a user's active sessions, most recent first.
    pub fn titles(&self, user_id: &str) -> Result<Vec<(String, String)>, SessionStoreError> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            r"
            SELECT id, title FROM sessions
            WHERE user_id = ?1 AND is_active = 1
            ORDER BY updated_at DESC
            ",
        )?;
        let rows: Result<Vec<(String, String)>, _> = stmt
            .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect();
        Ok(rows?)
    }
}

fn decode(document: &str) -> Result<Session, SessionStoreError> {
    Ok(serde_json::from_str(document)?)
}

impl SessionRepository for SessionStore {
    fn find_by_id(&self, id: &str) -> Result<Option<Session>, SessionStoreError> {
        let db = self.lock()?;
        let document: Option<String> = db
            .query_row(
                "SELECT document FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        document.as_deref().map(decode).transpose()
    }

    fn find_one(&self, filter: &SessionFilter) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.find_many(filter, 1)?.into_iter().next())
    }

    fn find_many(&self, filter: &SessionFilter, limit: usize) -> Result<Vec<Session>, SessionStoreError> {
        let (clause, mut values) = filter.to_sql();
        values.push(rusqlite::types::Value::Integer(limit as i64));
        let sql = format!(
            "SELECT document FROM sessions {clause} ORDER BY updated_at DESC LIMIT ?{}",
            values.len()
        );

        let db = self.lock()?;
        let mut stmt = db.prepare(&sql)?;
        let documents: Result<Vec<String>, _> = stmt
            .query_map(rusqlite::params_from_iter(values), |row| row.get(0))?
            .collect();

        documents?.iter().map(|d| decode(d)).collect()
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let document = serde_json::to_string(session)?;
        let db = self.lock()?;
        db.execute(
            r"
            INSERT INTO sessions (id, user_id, is_active, document, created_at, updated_at, title)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                is_active = excluded.is_active,
                document = excluded.document,
                updated_at = excluded.updated_at,
                title = excluded.title
            ",
            params![
                session.id,
                session.user_id,
                session.is_active,
                document,
                session.created_at.timestamp_millis(),
                session.updated_at.timestamp_millis(),
                session.title,
            ],
        )?;
        Ok(())
    }

    fn count(&self, filter: &SessionFilter) -> Result<usize, SessionStoreError> {
        let (clause, values) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) FROM sessions {clause}");
        let db = self.lock()?;
        let count: i64 = db.query_row(&sql, rusqlite::params_from_iter(values), |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::ComponentState;
    use crate::session::{ChatMessage, Role};
    use tempfile::tempdir;

    fn make_test_session(user: &str) -> Session {
        let mut session = Session::new(user, "Login form");
        session.chat_history.push(ChatMessage::new(Role::User, "Hello, world!"));
        session.current_component = ComponentState::new("<Login/>", ".login{}", true);
        session
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("sessions.db");
        let store = SessionStore::open(&db_path).unwrap();

        let session = make_test_session("alice");
        store.save(&session).unwrap();

        let loaded = store.find_by_id(&session.id).unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_save_replaces_whole_document() {
        let store = SessionStore::open_in_memory().unwrap();
        let mut session = make_test_session("alice");
        store.save(&session).unwrap();

        session.chat_history.clear();
        session.title = "Renamed".into();
        store.save(&session).unwrap();

        let loaded = store.find_by_id(&session.id).unwrap().unwrap();
        assert!(loaded.chat_history.is_empty());
        assert_eq!(store.titles("alice").unwrap()[0].1, "Renamed");
        assert_eq!(store.count(&SessionFilter::default()).unwrap(), 1);
    }

    #[test]
    fn test_not_found() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(store.find_by_id("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_filters() {
        let store = SessionStore::open_in_memory().unwrap();
        let a = make_test_session("alice");
        let mut b = make_test_session("alice");
        b.is_active = false;
        let c = make_test_session("bob");
        for s in [&a, &b, &c] {
            store.save(s).unwrap();
        }

        assert_eq!(store.count(&SessionFilter::active_for("alice")).unwrap(), 1);
        assert_eq!(store.count(&SessionFilter::default()).unwrap(), 3);

        let found = store
            .find_one(&SessionFilter::active_for("alice").with_id(&a.id))
            .unwrap();
        assert_eq!(found.map(|s| s.id), Some(a.id.clone()));

        // Inactive and foreign sessions do not match.
        assert!(
            store
                .find_one(&SessionFilter::active_for("alice").with_id(&b.id))
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_one(&SessionFilter::active_for("alice").with_id(&c.id))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_find_many_orders_by_update() {
        let store = SessionStore::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut session = make_test_session("alice");
            session.updated_at += chrono::Duration::seconds(i);
            ids.push(session.id.clone());
            store.save(&session).unwrap();
        }

        let recent = store.find_many(&SessionFilter::active_for("alice"), 3).unwrap();
        let got: Vec<_> = recent.iter().map(|s| s.id.clone()).collect();
        assert_eq!(got, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("sessions.db");
        let session = make_test_session("alice");
        {
            let store = SessionStore::open(&db_path).unwrap();
            store.save(&session).unwrap();
        }

        let store = SessionStore::open(&db_path).unwrap();
        let version: i32 = store
            .lock()
            .unwrap()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        assert!(store.find_by_id(&session.id).unwrap().is_some());
    }

    #[test]
    fn test_migrates_v1_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("sessions.db");
        let session = make_test_session("alice");
        {
            let db = Connection::open(&db_path).unwrap();
            db.execute_batch(
                r"
                CREATE TABLE sessions (
                    id TEXT PRIMARY KEY, user_id TEXT NOT NULL, is_active INTEGER NOT NULL,
                    document TEXT NOT NULL, created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL
                );
                PRAGMA user_version = 1;
                ",
            )
            .unwrap();
            db.execute(
                "INSERT INTO sessions VALUES (?1, ?2, 1, ?3, 0, 0)",
                params![session.id, session.user_id, serde_json::to_string(&session).unwrap()],
            )
            .unwrap();
        }

        let store = SessionStore::open(&db_path).unwrap();
        assert_eq!(
            store.titles("alice").unwrap(),
            vec![(session.id.clone(), "Login form".to_string())]
        );
    }
}
