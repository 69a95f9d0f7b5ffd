use rusqlite::{Connection, OptionalExtension, Result, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Database {
    conn: Connection,
}

/// The person whose friend list is collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub identifier: String,
    pub friend_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRelation {
    pub id: i64,
    pub subject_id: i64,
    pub label: String,
    pub locator: String,
}

/// A profile waiting to be crawled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlQueueEntry {
    pub id: i64,
    pub locator: String,
    pub queued_at: i64,
}

/// Idempotent-write contract used by the ingestion pipeline.
///
/// Callers always check `*_exists` before creating, so implementations only
/// need to report existence faithfully. The check-then-act pair is not atomic:
/// two writers ingesting the same subject at once can race. The SQLite schema
/// backs every key with a unique constraint so such a race fails loudly instead
/// of duplicating rows.
pub trait FriendStore {
    fn subject_exists(&self, identifier: &str) -> Result<bool>;
    fn create_subject(&self, identifier: &str) -> Result<i64>;
    fn get_subject(&self, identifier: &str) -> Result<Option<Subject>>;
    fn update_friend_count(&self, subject_id: i64, friend_count: i64) -> Result<()>;

    fn relation_exists(&self, subject_id: i64, label: &str, locator: &str) -> Result<bool>;
    fn create_relation(&self, subject_id: i64, label: &str, locator: &str) -> Result<i64>;
    fn count_relations(&self, subject_id: i64) -> Result<i64>;

    fn queue_entry_exists(&self, locator: &str) -> Result<bool>;
    fn create_queue_entry(&self, locator: &str) -> Result<i64>;
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl Database {
    /// Removes the database file along with its WAL sidecars
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)?;
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = Path::new(&sidecar);
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
        Ok(())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// In-memory database, mostly useful for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL UNIQUE,
    friend_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS friend_relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    locator TEXT NOT NULL,
    discovered_at INTEGER NOT NULL,

    FOREIGN KEY(subject_id) REFERENCES subjects(id) ON DELETE CASCADE,
    UNIQUE(subject_id, label, locator)
);

CREATE INDEX IF NOT EXISTS idx_friend_relations_subject ON friend_relations(subject_id);
CREATE INDEX IF NOT EXISTS idx_friend_relations_locator ON friend_relations(locator);

-- Profiles discovered while crawling, waiting for their own run
CREATE TABLE IF NOT EXISTS crawl_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    locator TEXT NOT NULL UNIQUE,
    queued_at INTEGER NOT NULL
);
            ",
        )?;
        Ok(())
    }

    // Read side
    pub fn list_subjects(&self) -> Result<Vec<Subject>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, identifier, friend_count FROM subjects ORDER BY identifier")?;

        let subjects = stmt
            .query_map([], |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    identifier: row.get(1)?,
                    friend_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(subjects)
    }

    pub fn list_relations(&self, subject_id: i64) -> Result<Vec<FriendRelation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, label, locator FROM friend_relations WHERE subject_id = ?1 ORDER BY id",
        )?;

        let relations = stmt
            .query_map(params![subject_id], |row| {
                Ok(FriendRelation {
                    id: row.get(0)?,
                    subject_id: row.get(1)?,
                    label: row.get(2)?,
                    locator: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(relations)
    }

    pub fn list_crawl_queue(&self) -> Result<Vec<CrawlQueueEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, locator, queued_at FROM crawl_queue ORDER BY id")?;

        let entries = stmt
            .query_map([], |row| {
                Ok(CrawlQueueEntry {
                    id: row.get(0)?,
                    locator: row.get(1)?,
                    queued_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(entries)
    }

    /// Removes and returns the oldest queued profile
    pub fn pop_crawl_queue(&self) -> Result<Option<CrawlQueueEntry>> {
        let tx = self.conn.unchecked_transaction()?;

        let entry = tx
            .query_row(
                "SELECT id, locator, queued_at FROM crawl_queue ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok(CrawlQueueEntry {
                        id: row.get(0)?,
                        locator: row.get(1)?,
                        queued_at: row.get(2)?,
                    })
                },
            )
            .optional()?;

        if let Some(ref entry) = entry {
            tx.execute("DELETE FROM crawl_queue WHERE id = ?1", params![entry.id])?;
        }
        tx.commit()?;

        Ok(entry)
    }
}

impl FriendStore for Database {
    fn subject_exists(&self, identifier: &str) -> Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM subjects WHERE identifier = ?1)",
            params![identifier],
            |row| row.get(0),
        )
    }

    fn create_subject(&self, identifier: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO subjects (identifier, friend_count, created_at) VALUES (?1, 0, ?2)",
            params![identifier, current_timestamp()],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_subject(&self, identifier: &str) -> Result<Option<Subject>> {
        self.conn
            .query_row(
                "SELECT id, identifier, friend_count FROM subjects WHERE identifier = ?1",
                params![identifier],
                |row| {
                    Ok(Subject {
                        id: row.get(0)?,
                        identifier: row.get(1)?,
                        friend_count: row.get(2)?,
                    })
                },
            )
            .optional()
    }

    fn update_friend_count(&self, subject_id: i64, friend_count: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE subjects SET friend_count = ?1, updated_at = ?2 WHERE id = ?3",
            params![friend_count, current_timestamp(), subject_id],
        )?;
        Ok(())
    }

    fn relation_exists(&self, subject_id: i64, label: &str, locator: &str) -> Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM friend_relations WHERE subject_id = ?1 AND label = ?2 AND locator = ?3)",
            params![subject_id, label, locator],
            |row| row.get(0),
        )
    }

    fn create_relation(&self, subject_id: i64, label: &str, locator: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO friend_relations (subject_id, label, locator, discovered_at) VALUES (?1, ?2, ?3, ?4)",
            params![subject_id, label, locator, current_timestamp()],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn count_relations(&self, subject_id: i64) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM friend_relations WHERE subject_id = ?1",
            params![subject_id],
            |row| row.get(0),
        )
    }

    fn queue_entry_exists(&self, locator: &str) -> Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM crawl_queue WHERE locator = ?1)",
            params![locator],
            |row| row.get(0),
        )
    }

    fn create_queue_entry(&self, locator: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO crawl_queue (locator, queued_at) VALUES (?1, ?2)",
            params![locator, current_timestamp()],
        )?;

        Ok(self.conn.last_insert_rowid())
    }
}
