//! Cache and profile persistence
//!
//! Single-connection sqlite store behind a mutex. Reads may be stale with
//! respect to a concurrent live generation (the worst case is a duplicate
//! upstream call, prevented separately by the gateway's keyed lock); writes
//! for a key go through `create_if_absent` / `append_turns` so a losing
//! duplicate writer cannot corrupt an existing entry.

mod schema;

pub use schema::*;

use crate::llm::Turn;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Stored history is not valid JSON: {0}")]
    CorruptHistory(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Cache Entry Operations ====================

    /// Look up a cached generation by request fingerprint
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> DbResult<Option<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT fingerprint, conversation_id, history, final_text, priming_turns, created_at
             FROM cache_entries WHERE fingerprint = ?1",
        )?;

        let row = stmt
            .query_row(params![fingerprint], map_entry_row)
            .optional()?;
        row.map(decode_entry).transpose()
    }

    /// Look up a cached generation by conversation id
    pub fn find_by_conversation_id(&self, conversation_id: &str) -> DbResult<Option<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT fingerprint, conversation_id, history, final_text, priming_turns, created_at
             FROM cache_entries WHERE conversation_id = ?1",
        )?;

        let row = stmt
            .query_row(params![conversation_id], map_entry_row)
            .optional()?;
        row.map(decode_entry).transpose()
    }

    /// Insert a finished generation unless the fingerprint already has one.
    ///
    /// Returns whether this call created the row; a duplicate second writer
    /// loses silently and the first entry stays intact.
    pub fn create_if_absent(&self, entry: &CacheEntry) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let history = serde_json::to_string(&entry.history)
            .map_err(|e| DbError::CorruptHistory(e.to_string()))?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO cache_entries
                 (fingerprint, conversation_id, history, final_text, priming_turns, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.fingerprint,
                entry.conversation_id,
                history,
                entry.final_text,
                entry.priming_turns as i64,
                entry.created_at.to_rfc3339(),
            ],
        )?;

        Ok(inserted == 1)
    }

    /// Append one (user, assistant) turn pair to a conversation's history.
    ///
    /// The stored history is re-read inside the transaction so appends from
    /// concurrent turns (e.g. a second browser tab) are never lost to a
    /// stale in-memory copy. Returns the new stored turn count.
    pub fn append_turns(
        &self,
        conversation_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> DbResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT history FROM cache_entries WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(stored) = stored else {
            return Err(DbError::ConversationNotFound(conversation_id.to_string()));
        };

        let mut history: Vec<Turn> = serde_json::from_str(&stored)
            .map_err(|e| DbError::CorruptHistory(e.to_string()))?;
        history.push(Turn::user(user_text));
        history.push(Turn::assistant(assistant_text));
        let new_len = history.len();

        let encoded = serde_json::to_string(&history)
            .map_err(|e| DbError::CorruptHistory(e.to_string()))?;
        tx.execute(
            "UPDATE cache_entries SET history = ?1 WHERE conversation_id = ?2",
            params![encoded, conversation_id],
        )?;
        tx.commit()?;

        Ok(new_len)
    }

    // ==================== Profile Operations ====================

    /// Create a user profile; fails if the uid is already registered
    pub fn create_profile(&self, profile: &UserProfile) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO profiles (uid, username, gender, birth_date, birth_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                profile.uid,
                profile.username,
                profile.gender.as_str(),
                profile.birth_date,
                profile.birth_time,
                profile.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a user profile by uid
    pub fn find_profile(&self, uid: &str) -> DbResult<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT uid, username, gender, birth_date, birth_time, created_at
             FROM profiles WHERE uid = ?1",
        )?;

        let row = stmt
            .query_row(params![uid], |row| {
                Ok(UserProfile {
                    uid: row.get(0)?,
                    username: row.get(1)?,
                    gender: Gender::parse(&row.get::<_, String>(2)?).unwrap_or(Gender::Male),
                    birth_date: row.get(3)?,
                    birth_time: row.get(4)?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            })
            .optional()?;
        Ok(row)
    }
}

/// Raw cache row before the history column is decoded
struct EntryRow {
    fingerprint: String,
    conversation_id: String,
    history: String,
    final_text: String,
    priming_turns: i64,
    created_at: String,
}

fn map_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        fingerprint: row.get(0)?,
        conversation_id: row.get(1)?,
        history: row.get(2)?,
        final_text: row.get(3)?,
        priming_turns: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn decode_entry(row: EntryRow) -> DbResult<CacheEntry> {
    let history: Vec<Turn> = serde_json::from_str(&row.history)
        .map_err(|e| DbError::CorruptHistory(e.to_string()))?;
    Ok(CacheEntry {
        fingerprint: row.fingerprint,
        conversation_id: row.conversation_id,
        history,
        final_text: row.final_text,
        priming_turns: row.priming_turns.max(0) as usize,
        created_at: parse_datetime(&row.created_at),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
