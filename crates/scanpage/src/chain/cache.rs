//! SQLite store of explorer page bodies, keyed by a hash of the request.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Parameters that do not change the response and must not land in the key.
const UNKEYED_PARAMS: [&str; 1] = ["apikey"];

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Page cache. Lets an `--offline` run replay a previous collection exactly.
pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    /// Open or create the cache at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pages (
                key TEXT PRIMARY KEY,
                body BLOB NOT NULL,
                fetched_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pages_fetched ON pages(fetched_utc);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// SHA-256 hex of arbitrary content.
    pub fn key_for(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Key for a GET: base URL plus sorted parameters, API key excluded.
    pub fn key_for_request(base_url: &str, params: &[(String, String)]) -> String {
        let mut kept: Vec<_> = params
            .iter()
            .filter(|(k, _)| !UNKEYED_PARAMS.contains(&k.as_str()))
            .collect();
        kept.sort();
        let mut content = base_url.trim_end_matches('/').to_string();
        for (k, v) in kept {
            content.push('&');
            content.push_str(k);
            content.push('=');
            content.push_str(v);
        }
        Self::key_for(&content)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut stmt = conn.prepare("SELECT body FROM pages WHERE key = ?1")?;
        let row = stmt
            .query_row([key], |r| r.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(row)
    }

    pub fn set(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let fetched = time::OffsetDateTime::now_utc().unix_timestamp();
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO pages (key, body, fetched_utc) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, body, fetched],
        )?;
        Ok(())
    }

    /// Cached body as UTF-8; `None` if missing or not valid UTF-8.
    pub fn get_json(&self, key: &str) -> Result<Option<String>, CacheError> {
        let raw = self.get(key)?;
        Ok(raw.and_then(|b| String::from_utf8(b).ok()))
    }

    pub fn set_json(&self, key: &str, json: &str) -> Result<(), CacheError> {
        self.set(key, json.as_bytes())
    }

    /// Number of cached pages.
    pub fn len(&self) -> Result<u64, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
