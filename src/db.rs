//! SQLite-backed collaborators: the word datastore and the fast key-value cache.

use crate::error::{DictError, Result};
use crate::models::{WordFilter, WordRecord};
use crate::progress::{ProgressCallback, ProgressUpdate};
use log::{debug, error, info, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// --- Collaborator Traits ---

/// Read access to the word collection.
pub trait WordStore: Send + Sync {
    /// Returns every record matching `filter`, in storage order.
    fn read(&self, filter: &WordFilter) -> Result<Vec<WordRecord>>;
}

/// String key-value store with per-entry expiry.
pub trait KvCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

// --- Schema Definition ---

const SCHEMA_VERSION: u32 = 1;

const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

const CREATE_WORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS words (
    pk INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT, -- Source document id, if any
    w TEXT NOT NULL,
    yb TEXT,
    cx TEXT,
    sy TEXT,
    definition TEXT,
    example TEXT,
    audio TEXT,
    uk TEXT,
    us TEXT
);";

const CREATE_WORD_CODES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS word_codes (
    word_pk INTEGER NOT NULL,
    position INTEGER NOT NULL, -- Keeps the stored order of course codes
    code INTEGER NOT NULL,
    PRIMARY KEY (word_pk, position),
    FOREIGN KEY (word_pk) REFERENCES words(pk)
);";

const CREATE_KV_TABLE: &str = "
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL -- Unix epoch milliseconds
);";

// --- Indices ---

const CREATE_WORD_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_words_w ON words (w);";
const CREATE_CODE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_word_codes_code ON word_codes (code);";

// Helper function to open/create the database connection
fn open_db_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;
    // WAL keeps readers from blocking the cache writer
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| DictError::Internal("Mutex poisoned".to_string()))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// --- Initialization Function ---

/// Creates the word tables and indices if they don't exist.
/// Also checks and sets the schema version.
pub fn initialize_database(conn: &mut Connection) -> Result<()> {
    info!(
        "Initializing word database schema (version {})...",
        SCHEMA_VERSION
    );
    let tx = conn.transaction()?;

    tx.execute(CREATE_METADATA_TABLE, [])?;
    tx.execute(CREATE_WORDS_TABLE, [])?;
    tx.execute(CREATE_WORD_CODES_TABLE, [])?;
    tx.execute(CREATE_WORD_INDEX, [])?;
    tx.execute(CREATE_CODE_INDEX, [])?;

    let existing_version_str: Option<String> = tx
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing_version_str {
        Some(v_str) => {
            let existing_version: u32 = v_str.parse().map_err(|e| {
                DictError::Internal(format!(
                    "Failed to parse existing schema version '{}': {}",
                    v_str, e
                ))
            })?;
            if existing_version != SCHEMA_VERSION {
                warn!(
                    "Database schema version ({}) differs from expected ({}).",
                    existing_version, SCHEMA_VERSION
                );
            } else {
                debug!(
                    "Database schema version ({}) matches expected version.",
                    existing_version
                );
            }
        }
        None => {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
            info!("Set initial schema version in metadata table.");
        }
    }

    tx.commit()?;
    Ok(())
}

// --- Word Store ---

/// The word collection in a SQLite file.
#[derive(Clone)] // Clone is cheap due to Arc<Mutex<...>>
pub struct SqliteWordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWordStore {
    /// Opens (or creates) the database at `path` and makes sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening word database: {:?}", path);
        let mut conn = open_db_connection(path)?;
        initialize_database(&mut conn)?;
        Ok(SqliteWordStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        initialize_database(&mut conn)?;
        Ok(SqliteWordStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<u64> {
        let conn = lock(&self.conn)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM words", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Appends `records` to the collection in one transaction.
    pub fn import_records(
        &self,
        records: &[WordRecord],
        mut reporter: Option<ProgressCallback>,
    ) -> Result<u64> {
        const STAGE: &str = "Importing words";
        info!("Importing {} word records...", records.len());
        let start_time = Instant::now();
        let total = records.len() as u64;

        let mut maybe_report = |update: ProgressUpdate| {
            if let Some(cb) = reporter.as_mut() {
                let _ = cb(update);
            }
        };
        maybe_report(ProgressUpdate::new_stage(STAGE.to_string(), Some(total)));

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut word_stmt = tx.prepare(
                "INSERT INTO words (id, w, yb, cx, sy, definition, example, audio, uk, us)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            let mut code_stmt = tx.prepare(
                "INSERT INTO word_codes (word_pk, position, code) VALUES (?1, ?2, ?3)",
            )?;

            for (i, record) in records.iter().enumerate() {
                let pk = word_stmt.insert(params![
                    record.id,
                    record.word,
                    record.phonetic,
                    record.part_of_speech,
                    record.gloss,
                    record.definition,
                    record.example,
                    record.audio_path,
                    record.uk_phonetic,
                    record.us_phonetic,
                ])?;
                for (position, code) in record.codes.iter().enumerate() {
                    code_stmt.execute(params![pk, position as i64, code])?;
                }
                maybe_report(ProgressUpdate {
                    stage_description: STAGE.to_string(),
                    current_item: i as u64 + 1,
                    total_items: Some(total),
                    message: Some(record.word.clone()),
                });
            }
        }
        tx.commit()?;

        info!(
            "Imported {} records. Took {:.2?}",
            total,
            start_time.elapsed()
        );
        Ok(total)
    }

    /// Removes every record, keeping the schema.
    pub fn clear(&self) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM word_codes", [])?;
        tx.execute("DELETE FROM words", [])?;
        tx.commit()?;
        info!("Cleared word collection.");
        Ok(())
    }

    /// Deletes the database file at `path` along with its WAL/SHM companions.
    pub fn clear_database(path: &Path) -> Result<()> {
        if !path.exists() {
            info!("Database file not found, nothing to clear: {:?}", path);
            return Ok(());
        }
        match fs::remove_file(path) {
            Ok(_) => {
                info!("Successfully deleted database file: {:?}", path);
                for companion in [wal_path(path), shm_path(path)] {
                    if companion.exists() {
                        let _ = fs::remove_file(companion); // Ignore error if deletion fails
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete database file {:?}: {}", path, e);
                Err(DictError::Io(e))
            }
        }
    }

    fn fetch_codes(conn: &Connection, pk: i64) -> Result<Vec<i64>> {
        let mut stmt =
            conn.prepare("SELECT code FROM word_codes WHERE word_pk = ?1 ORDER BY position")?;
        let codes = stmt.query_map(params![pk], |row| row.get(0))?;
        codes
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(DictError::from)
    }
}

fn wal_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push("-wal");
    PathBuf::from(s)
}

fn shm_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push("-shm");
    PathBuf::from(s)
}

const SELECT_WORD_COLUMNS: &str =
    "SELECT words.pk, words.id, words.w, words.yb, words.cx, words.sy, words.definition, words.example, words.audio, words.uk, words.us FROM words";

// Map a row (without codes) to a WordRecord
fn row_to_record(row: &Row) -> std::result::Result<(i64, WordRecord), rusqlite::Error> {
    Ok((
        row.get(0)?,
        WordRecord {
            id: row.get(1)?,
            codes: Vec::new(),
            word: row.get(2)?,
            phonetic: row.get(3)?,
            part_of_speech: row.get(4)?,
            gloss: row.get(5)?,
            definition: row.get(6)?,
            example: row.get(7)?,
            audio_path: row.get(8)?,
            uk_phonetic: row.get(9)?,
            us_phonetic: row.get(10)?,
        },
    ))
}

impl WordStore for SqliteWordStore {
    fn read(&self, filter: &WordFilter) -> Result<Vec<WordRecord>> {
        debug!("read: filter={:?}", filter);
        let conn = lock(&self.conn)?;

        let rows = match filter {
            WordFilter::Word(word) => {
                let mut stmt =
                    conn.prepare(&format!("{} WHERE words.w = ?1 ORDER BY words.pk", SELECT_WORD_COLUMNS))?;
                let iter = stmt.query_map(params![word], row_to_record)?;
                iter.collect::<std::result::Result<Vec<_>, _>>()?
            }
            WordFilter::Code(code) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE words.pk IN (SELECT word_pk FROM word_codes WHERE code = ?1) ORDER BY words.pk",
                    SELECT_WORD_COLUMNS
                ))?;
                let iter = stmt.query_map(params![code], row_to_record)?;
                iter.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for (pk, mut record) in rows {
            record.codes = Self::fetch_codes(&conn, pk)?;
            records.push(record);
        }
        Ok(records)
    }
}

// --- Fast Cache ---

/// Key-value cache table with millisecond expiry.
#[derive(Clone)]
pub struct SqliteKvCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvCache {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening cache database: {:?}", path);
        let conn = open_db_connection(path)?;
        conn.execute(CREATE_KV_TABLE, [])?;
        Ok(SqliteKvCache {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(CREATE_KV_TABLE, [])?;
        Ok(SqliteKvCache {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Deletes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM kv_cache WHERE expires_at <= ?1",
            params![now_millis()],
        )?;
        info!("Purged {} expired cache entries.", removed);
        Ok(removed)
    }
}

impl KvCache for SqliteKvCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = lock(&self.conn)?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv_cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((value, expires_at)) if expires_at > now_millis() => Ok(Some(value)),
            Some(_) => {
                debug!("Cache entry expired: {}", key);
                conn.execute("DELETE FROM kv_cache WHERE key = ?1", params![key])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = now_millis().saturating_add(ttl.as_millis() as i64);
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO kv_cache (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }
}
