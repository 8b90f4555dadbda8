//! SQLite-backed sample store
//!
//! Layout: a `collections` table fixing each collection's embedding
//! dimension, and a `samples` table keyed by `(collection, id)` with the
//! embedding as a little-endian `f32` blob. Nearest-neighbor queries scan the
//! collection; libraries of short samples stay small enough for that.
//!
//! Each handle holds two connections to the WAL-mode database. Writes go
//! through one; reads use a separate read-only one, so a search never waits
//! for an indexing batch to commit and sees the last committed state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::record::{embedding_from_bytes, embedding_to_bytes};
use super::{nearest, QueryHit, SampleMetadata, SampleRecord, SampleStore};
use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name      TEXT PRIMARY KEY,
    dimension INTEGER
);
CREATE TABLE IF NOT EXISTS samples (
    collection      TEXT NOT NULL,
    id              TEXT NOT NULL,
    document        TEXT NOT NULL,
    embedding       BLOB NOT NULL,
    filename        TEXT NOT NULL,
    bpm             REAL NOT NULL DEFAULT 0,
    key             TEXT NOT NULL DEFAULT '',
    analysis_engine TEXT NOT NULL DEFAULT '',
    duration_secs   REAL,
    PRIMARY KEY (collection, id)
);
";

/// Sample store in one SQLite database file
pub struct SqliteStore {
    path: PathBuf,
    collection: String,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("collection", &self.collection)
            .finish()
    }
}

impl SqliteStore {
    /// Create (or open) a store at `path`, creating parent directories
    ///
    /// # Errors
    ///
    /// `StoreError::Io` if the parent directory cannot be created;
    /// `StoreError::Open` if the file cannot be created or initialized
    pub fn create(path: &Path, collection: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        Self::connect(path, collection, flags)
    }

    /// Open an existing store
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no database exists at `path`;
    /// `StoreError::Open` if it exists but cannot be opened
    pub fn open(path: &Path, collection: &str) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Self::connect(path, collection, OpenFlags::SQLITE_OPEN_READ_WRITE)
    }

    fn connect(path: &Path, collection: &str, flags: OpenFlags) -> Result<Self, StoreError> {
        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(open_err)?;
        conn.execute_batch(SCHEMA).map_err(open_err)?;
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, dimension) VALUES (?1, NULL)",
            params![collection],
        )
        .map_err(open_err)?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM samples WHERE collection = ?1",
                params![collection],
                |r| r.get(0),
            )
            .map_err(open_err)?;
        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_err)?;
        reader.pragma_update(None, "query_only", 1).map_err(open_err)?;

        log::info!(
            "Sample store {} ready: collection '{}' holds {} samples",
            path.display(),
            collection,
            count
        );

        Ok(Self {
            path: path.to_path_buf(),
            collection: collection.to_string(),
            writer: Mutex::new(conn),
            reader: Mutex::new(reader),
        })
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Collection this handle reads and writes
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn read(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.reader.lock().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.writer.lock().map_err(|_| StoreError::Poisoned)
    }

    fn dimension(conn: &Connection, collection: &str) -> Result<Option<usize>, StoreError> {
        let dim: Option<Option<i64>> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![collection],
                |r| r.get(0),
            )
            .optional()?;
        Ok(dim.flatten().map(|d| d as usize))
    }
}

fn metadata_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<SampleMetadata> {
    Ok(SampleMetadata {
        filename: row.get(offset)?,
        bpm: row.get::<_, f64>(offset + 1)? as f32,
        key: row.get(offset + 2)?,
        analysis_engine: row.get(offset + 3)?,
        duration_secs: row.get::<_, Option<f64>>(offset + 4)?.map(|d| d as f32),
    })
}

impl SampleStore for SqliteStore {
    fn get_all_ids(&self) -> Result<HashSet<String>, StoreError> {
        let conn = self.read()?;
        let mut stmt = conn.prepare("SELECT id FROM samples WHERE collection = ?1")?;
        let ids = stmt
            .query_map(params![self.collection], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    fn add(&self, records: &[SampleRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.write()?;

        let expected = match Self::dimension(&conn, &self.collection)? {
            Some(dim) => dim,
            None => records[0].embedding.len(),
        };
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                found: bad.embedding.len(),
            });
        }

        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE collections SET dimension = ?2 WHERE name = ?1 AND dimension IS NULL",
            params![self.collection, expected as i64],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO samples
                 (collection, id, document, embedding, filename, bpm, key, analysis_engine, duration_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for record in records {
                let meta = &record.metadata;
                stmt.execute(params![
                    self.collection,
                    record.id,
                    record.document,
                    embedding_to_bytes(&record.embedding),
                    meta.filename,
                    meta.bpm as f64,
                    meta.key,
                    meta.analysis_engine,
                    meta.duration_secs.map(|d| d as f64),
                ])?;
            }
        }
        tx.commit()?;

        log::debug!("Wrote {} samples to '{}'", records.len(), self.collection);
        Ok(())
    }

    fn update(&self, updates: &[(String, SampleMetadata)]) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut conn = self.write()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE samples
                 SET filename = ?3, bpm = ?4, key = ?5, analysis_engine = ?6, duration_secs = ?7
                 WHERE collection = ?1 AND id = ?2",
            )?;
            for (id, meta) in updates {
                let changed = stmt.execute(params![
                    self.collection,
                    id,
                    meta.filename,
                    meta.bpm as f64,
                    meta.key,
                    meta.analysis_engine,
                    meta.duration_secs.map(|d| d as f64),
                ])?;
                if changed == 0 {
                    log::warn!("Ignoring update of unknown sample {}", id);
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<(String, SampleMetadata)>, StoreError> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, bpm, key, analysis_engine, duration_secs
             FROM samples WHERE collection = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![self.collection], |r| Ok((r.get::<_, String>(0)?, metadata_from_row(r, 1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>, StoreError> {
        let conn = self.read()?;
        if let Some(dim) = Self::dimension(&conn, &self.collection)? {
            if dim != embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: dim,
                    found: embedding.len(),
                });
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, document, embedding, filename, bpm, key, analysis_engine, duration_secs
             FROM samples WHERE collection = ?1",
        )?;
        let rows = stmt
            .query_map(params![self.collection], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Vec<u8>>(2)?,
                    metadata_from_row(r, 3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut decoded = Vec::with_capacity(rows.len());
        for (id, document, blob, metadata) in rows {
            let vector = embedding_from_bytes(&blob)
                .ok_or_else(|| StoreError::Corrupt(format!("embedding blob of {} has {} bytes", id, blob.len())))?;
            decoded.push((id, document, metadata, vector));
        }

        Ok(nearest(
            embedding,
            decoded
                .iter()
                .map(|(id, doc, meta, vector)| (id.as_str(), doc.as_str(), meta, vector.as_slice())),
            k,
        ))
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.read()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM samples WHERE collection = ?1",
            params![self.collection],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}
