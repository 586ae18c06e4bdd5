//! Database schema and types

use crate::llm::Turn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    fingerprint TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL UNIQUE,
    history TEXT NOT NULL,
    final_text TEXT NOT NULL,
    priming_turns INTEGER NOT NULL DEFAULT 2,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_conversation ON cache_entries(conversation_id);

CREATE TABLE IF NOT EXISTS profiles (
    uid TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    gender TEXT NOT NULL,
    birth_date TEXT NOT NULL,
    birth_time TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Cached generation record: the unit of idempotency and conversation state.
///
/// Created only when a live generation completes; `fingerprint`,
/// `conversation_id`, and `final_text` are immutable afterwards. The history
/// grows strictly in (user, assistant) pairs appended by continuation turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub conversation_id: String,
    pub history: Vec<Turn>,
    pub final_text: String,
    /// Number of leading priming turns hidden from the end-user view.
    pub priming_turns: usize,
    pub created_at: DateTime<Utc>,
}

/// Registered end-user profile, input to the prompt builder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub username: String,
    pub gender: Gender,
    pub birth_date: String,
    pub birth_time: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }
}
