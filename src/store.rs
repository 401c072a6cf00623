//! Local document store for profile, chat history and wardrobe
//!
//! Every document is a whole JSON blob under a fixed key. Writes replace the
//! full document; the last writer wins unless the caller opts into
//! `put_if_version`.

use crate::models::{ClothingItem, Message, UserProfile};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const KEY_USER_PROFILE: &str = "userProfile";
pub const KEY_CHAT_HISTORY: &str = "chatHistory";
pub const KEY_CLOTHING_ITEMS: &str = "clothingItems";
pub const KEY_ONBOARDING_COMPLETED: &str = "onboardingCompleted";

/// Maximum number of chat messages kept on disk
pub const CHAT_HISTORY_CAP: usize = 50;

#[derive(Debug, Clone)]
pub struct ProfileStore {
    db_path: PathBuf,
}

impl ProfileStore {
    /// Opens the store at `db_path`, creating the file and table if needed
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, String> {
        let store = Self {
            db_path: db_path.into(),
        };
        store.connect()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, String> {
        crate::paths::ensure_parent_dir(&self.db_path)?;

        let conn = Connection::open(&self.db_path)
            .map_err(|e| format!("Failed to open database: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| format!("Failed to create table: {}", e))?;

        Ok(conn)
    }

    // ============ Raw Documents ============

    /// Reads and decodes a document, `None` when the key was never written
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, String> {
        let conn = self.connect()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM documents WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("Failed to read {}: {}", key, e))?;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| format!("Failed to parse {}: {}", key, e)),
            None => Ok(None),
        }
    }

    /// Replaces the whole document and returns its new version
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<u64, String> {
        let conn = self.connect()?;
        Self::upsert(&conn, key, value)
    }

    /// Replaces the document only if its stored version still equals `expected`.
    /// A missing document has version 0.
    pub fn put_if_version<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expected: u64,
    ) -> Result<u64, String> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(|e| format!("Failed to begin transaction: {}", e))?;

        let current = Self::version_of(&tx, key)?;
        if current != expected {
            return Err(format!(
                "Stale write for {}: expected version {}, found {}",
                key, expected, current
            ));
        }

        let version = Self::upsert(&tx, key, value)?;
        tx.commit()
            .map_err(|e| format!("Failed to commit {}: {}", key, e))?;
        Ok(version)
    }

    /// Current version of a document, 0 if absent
    pub fn version(&self, key: &str) -> Result<u64, String> {
        let conn = self.connect()?;
        Self::version_of(&conn, key)
    }

    pub fn remove(&self, key: &str) -> Result<(), String> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM documents WHERE key = ?1", params![key])
            .map_err(|e| format!("Failed to remove {}: {}", key, e))?;
        Ok(())
    }

    fn version_of(conn: &Connection, key: &str) -> Result<u64, String> {
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM documents WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("Failed to read version of {}: {}", key, e))?;
        Ok(version.unwrap_or(0) as u64)
    }

    fn upsert<T: Serialize>(conn: &Connection, key: &str, value: &T) -> Result<u64, String> {
        let json = serde_json::to_string(value)
            .map_err(|e| format!("Failed to serialize {}: {}", key, e))?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO documents (key, value, version, updated_at) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = documents.version + 1,
                updated_at = excluded.updated_at",
            params![key, json, updated_at],
        )
        .map_err(|e| format!("Failed to store {}: {}", key, e))?;

        Self::version_of(conn, key)
    }

    // ============ Profile ============

    pub fn load_profile(&self) -> Result<Option<UserProfile>, String> {
        self.get(KEY_USER_PROFILE)
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<(), String> {
        self.put(KEY_USER_PROFILE, profile).map(|_| ())
    }

    /// Stores the onboarding answers and marks onboarding as done
    pub fn complete_onboarding(&self, profile: &UserProfile) -> Result<(), String> {
        self.save_profile(profile)?;
        self.put(KEY_ONBOARDING_COMPLETED, &true).map(|_| ())
    }

    pub fn is_onboarding_completed(&self) -> Result<bool, String> {
        Ok(self.get::<bool>(KEY_ONBOARDING_COMPLETED)?.unwrap_or(false))
    }

    /// Logout: drops the local copy of the profile only
    pub fn clear_profile(&self) -> Result<(), String> {
        self.remove(KEY_USER_PROFILE)
    }

    // ============ Chat History ============

    pub fn load_chat_history(&self) -> Result<Vec<Message>, String> {
        Ok(self.get(KEY_CHAT_HISTORY)?.unwrap_or_default())
    }

    /// Writes the last `CHAT_HISTORY_CAP` messages
    pub fn save_chat_history(&self, messages: &[Message]) -> Result<(), String> {
        let start = messages.len().saturating_sub(CHAT_HISTORY_CAP);
        self.put(KEY_CHAT_HISTORY, &&messages[start..]).map(|_| ())
    }

    pub fn clear_chat_history(&self) -> Result<(), String> {
        self.remove(KEY_CHAT_HISTORY)
    }

    // ============ Wardrobe ============

    pub fn load_clothing_items(&self) -> Result<Vec<ClothingItem>, String> {
        Ok(self.get(KEY_CLOTHING_ITEMS)?.unwrap_or_default())
    }

    pub fn save_clothing_items(&self, items: &[ClothingItem]) -> Result<(), String> {
        self.put(KEY_CLOTHING_ITEMS, &items).map(|_| ())
    }
}
