//! Record store seam and the SQLite implementation.
//!
//! The engine only ever talks to [`RecordStore`]: per-pillar range queries
//! plus the two summary caches. The bundled [`SqliteRecordStore`] keeps one
//! row per record with the payload as a JSON column, so both historical
//! shapes (flat and `log`-nested) live side by side and are range-queried
//! with `json_extract` on whichever date key the caller names.
//!
//! Instants inside payloads and query ranges are RFC 3339 UTC strings at
//! millisecond precision (`2026-03-10T05:00:00.000Z`), which compare
//! lexicographically. [`store_instant`] produces the canonical form.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;
use crate::pillars::Pillar;
use crate::types::{ClientSummary, DailySummary, RawRecord};

/// Format an instant in the store's canonical encoding.
pub fn store_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The queryable per-client, per-pillar record store the engine reads from.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch every record in `collection(pillar)` for `client_id` whose
    /// `date_field` value falls inside `[range_start, range_end]`.
    ///
    /// `date_field` may be dotted (`log.entryDate`) to address the nested
    /// legacy shape.
    async fn query(
        &self,
        pillar: Pillar,
        client_id: &str,
        date_field: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError>;

    async fn get_daily_summary(
        &self,
        client_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, StoreError>;

    /// Persist a daily summary with top-level merge semantics: fields absent
    /// from `summary`'s serialization but present in the cached document are
    /// left untouched.
    async fn put_daily_summary(
        &self,
        client_id: &str,
        date: NaiveDate,
        summary: &DailySummary,
    ) -> Result<(), StoreError>;

    async fn get_client_summary(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientSummary>, StoreError>;

    async fn put_client_summary(
        &self,
        client_id: &str,
        summary: &ClientSummary,
    ) -> Result<(), StoreError>;
}

/// SQLite-backed store. The connection is wrapped in a non-poisoning mutex;
/// every call holds it only for the duration of one statement batch.
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the store at `~/.pillars/pillars.db`.
    pub fn open() -> Result<Self, StoreError> {
        Self::open_at(Self::default_db_path()?)
    }

    /// Open a store at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;

        log::info!("Record store opened at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Resolve the default database path: `~/.pillars/pillars.db`.
    pub fn default_db_path() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeDirNotFound)?;
        Ok(home.join(".pillars").join("pillars.db"))
    }

    /// Idempotent schema init, run at every open.
    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                client_id  TEXT NOT NULL,
                pillar     TEXT NOT NULL,
                id         TEXT NOT NULL,
                payload    TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (client_id, pillar, id)
            );
            CREATE INDEX IF NOT EXISTS idx_records_client_pillar
                ON records (client_id, pillar);
            CREATE TABLE IF NOT EXISTS daily_summaries (
                client_id  TEXT NOT NULL,
                date       TEXT NOT NULL,
                summary    TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (client_id, date)
            );
            CREATE TABLE IF NOT EXISTS client_summaries (
                client_id  TEXT PRIMARY KEY,
                summary    TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Insert a record, minting a v4 id. Returns the id.
    ///
    /// This is the minimal write surface the CRUD collaborator needs; the
    /// write path is otherwise out of scope for the engine.
    pub fn insert_record(
        &self,
        client_id: &str,
        pillar: Pillar,
        payload: &Map<String, Value>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.upsert_record(client_id, pillar, &id, payload)?;
        Ok(id)
    }

    /// Insert or replace a record under an explicit id.
    pub fn upsert_record(
        &self,
        client_id: &str,
        pillar: Pillar,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(payload)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO records (client_id, pillar, id, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (client_id, pillar, id) DO UPDATE SET
                 payload = excluded.payload,
                 updated_at = excluded.updated_at",
            params![
                client_id,
                pillar.as_str(),
                id,
                encoded,
                store_instant(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn delete_record(
        &self,
        client_id: &str,
        pillar: Pillar,
        id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM records WHERE client_id = ?1 AND pillar = ?2 AND id = ?3",
            params![client_id, pillar.as_str(), id],
        )?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn query(
        &self,
        pillar: Pillar,
        client_id: &str,
        date_field: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, payload FROM records
             WHERE client_id = ?1 AND pillar = ?2
               AND json_extract(payload, '$.' || ?3) BETWEEN ?4 AND ?5",
        )?;

        let rows = stmt.query_map(
            params![
                client_id,
                pillar.as_str(),
                date_field,
                store_instant(range_start),
                store_instant(range_end),
            ],
            |row| {
                let id: String = row.get(0)?;
                let payload: String = row.get(1)?;
                Ok((id, payload))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            match serde_json::from_str::<Map<String, Value>>(&payload) {
                Ok(fields) => records.push(RawRecord { id, pillar, fields }),
                Err(e) => {
                    // Corrupt payloads degrade to "no data", same as a
                    // failed pillar query.
                    log::warn!("skipping unparseable {} record {}: {}", pillar.as_str(), id, e);
                }
            }
        }
        Ok(records)
    }

    async fn get_daily_summary(
        &self,
        client_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, StoreError> {
        let conn = self.conn.lock();
        let result: Result<String, _> = conn.query_row(
            "SELECT summary FROM daily_summaries WHERE client_id = ?1 AND date = ?2",
            params![client_id, date.to_string()],
            |row| row.get(0),
        );
        match result {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_daily_summary(
        &self,
        client_id: &str,
        date: NaiveDate,
        summary: &DailySummary,
    ) -> Result<(), StoreError> {
        let fresh = serde_json::to_value(summary)?;
        let conn = self.conn.lock();

        // Merge semantics: top-level fields not produced by this
        // computation stay untouched in the cached document.
        let existing: Option<String> = conn
            .query_row(
                "SELECT summary FROM daily_summaries WHERE client_id = ?1 AND date = ?2",
                params![client_id, date.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let merged = match existing.and_then(|json| serde_json::from_str::<Value>(&json).ok()) {
            Some(Value::Object(mut base)) => {
                if let Value::Object(fresh_map) = fresh {
                    for (key, value) in fresh_map {
                        base.insert(key, value);
                    }
                }
                Value::Object(base)
            }
            _ => fresh,
        };

        conn.execute(
            "INSERT INTO daily_summaries (client_id, date, summary, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (client_id, date) DO UPDATE SET
                 summary = excluded.summary,
                 updated_at = excluded.updated_at",
            params![
                client_id,
                date.to_string(),
                serde_json::to_string(&merged)?,
                store_instant(Utc::now()),
            ],
        )?;
        Ok(())
    }

    async fn get_client_summary(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientSummary>, StoreError> {
        let conn = self.conn.lock();
        let result: Result<String, _> = conn.query_row(
            "SELECT summary FROM client_summaries WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        );
        match result {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_client_summary(
        &self,
        client_id: &str,
        summary: &ClientSummary,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(summary)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO client_summaries (client_id, summary, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (client_id) DO UPDATE SET
                 summary = excluded.summary,
                 updated_at = excluded.updated_at",
            params![client_id, encoded, store_instant(Utc::now())],
        )?;
        Ok(())
    }
}
