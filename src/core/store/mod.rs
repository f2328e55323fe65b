//! SQLite-backed persistence for records, requests, communities and the search index
//!
//! Every write goes through [`Store::apply`], which runs a batch of staged
//! operations in one transaction. Records and requests carry a revision that
//! is checked on update; a stale revision rolls the whole batch back.

mod serialize;


use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::core::community::Community;
use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityRef};
use crate::entities::record::{Record, ReviewRef};
use crate::entities::request::{Request, RequestEvent, RequestStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    revision INTEGER NOT NULL,
    is_published INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS requests (
    id TEXT PRIMARY KEY,
    revision INTEGER NOT NULL,
    status TEXT NOT NULL,
    topic TEXT NOT NULL,
    receiver TEXT NOT NULL,
    expires_at TEXT,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS communities (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS request_events (
    id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS search_index (
    id TEXT PRIMARY KEY,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_requests_topic ON requests(topic);
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_events_request ON request_events(request_id);
"#;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Concurrent modification of {kind} {id}: revision {expected} is stale")]
    Conflict {
        kind: &'static str,
        id: String,
        expected: u32,
    },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// A single staged write
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert (revision 0) or update a record
    CommitRecord(Record),
    /// Insert (revision 0) or update a request
    CommitRequest(Request),
    /// Remove a request at the given revision
    DeleteRequest { id: EntityId, revision: u32 },
    /// Rebuild the search document of a record from its committed state
    IndexRecord(EntityId),
    /// Append an audit event
    AppendEvent(RequestEvent),
}

/// Entities written by a successful [`Store::apply`], with their new revisions
#[derive(Debug, Default)]
pub struct Applied {
    pub records: Vec<Record>,
    pub requests: Vec<Request>,
}

/// A resolved request reference
#[derive(Debug, Clone)]
pub enum Resolved {
    User(EntityId),
    Community(Community),
    Record(Record),
}

/// Search document for a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: EntityId,
    pub title: String,
    pub is_published: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewRef>,

    #[serde(default)]
    pub communities: Vec<EntityId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_community: Option<EntityId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    pub revision: u32,
}

impl From<&Record> for IndexDocument {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            title: record.metadata.title.clone(),
            is_published: record.is_published,
            review: record.parent.review,
            communities: record.parent.communities.ids().copied().collect(),
            default_community: record.parent.communities.default().copied(),
            doi: record.pids.doi.as_ref().map(|p| p.pid_value.clone()),
            revision: record.revision,
        }
    }
}

/// Handle to the database; cheap to clone
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Store {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("store schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // =====================================================================
    // Reads
    // =====================================================================

    pub fn get_record(&self, id: &EntityId) -> Result<Option<Record>, StoreError> {
        let conn = self.lock()?;
        read_record(&conn, id)
    }

    /// Load a record that must exist
    pub fn require_record(&self, id: &EntityId) -> Result<Record, StoreError> {
        self.get_record(id)?.ok_or_else(|| StoreError::NotFound {
            kind: "record",
            id: id.to_string(),
        })
    }

    pub fn get_request(&self, id: &EntityId) -> Result<Option<Request>, StoreError> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM requests WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Load a request that must exist
    pub fn require_request(&self, id: &EntityId) -> Result<Request, StoreError> {
        self.get_request(id)?.ok_or_else(|| StoreError::NotFound {
            kind: "request",
            id: id.to_string(),
        })
    }

    pub fn get_community(&self, id: &EntityId) -> Result<Option<Community>, StoreError> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM communities WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Insert or replace a community
    ///
    /// Communities are managed outside the request workflow, so they are
    /// written directly without revision checks.
    pub fn save_community(&self, community: &Community) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO communities (id, slug, data) VALUES (?1, ?2, ?3)",
            params![community.id, community.slug, serde_json::to_string(community)?],
        )?;
        Ok(())
    }

    /// Resolve a typed reference to its aggregate
    ///
    /// Users are not stored here, so a user reference resolves to its ID.
    pub fn resolve(&self, reference: &EntityRef) -> Result<Resolved, StoreError> {
        match reference {
            EntityRef::User(id) => Ok(Resolved::User(*id)),
            EntityRef::Community(id) => self
                .get_community(id)?
                .map(Resolved::Community)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "community",
                    id: id.to_string(),
                }),
            EntityRef::Record(id) => self.require_record(id).map(Resolved::Record),
        }
    }

    /// All requests whose topic is the given record, oldest first
    pub fn requests_for_topic(&self, record: &EntityId) -> Result<Vec<Request>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM requests WHERE topic = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map([record], |row| row.get::<_, String>(0))?;
        let mut requests = Vec::new();
        for data in rows {
            requests.push(serde_json::from_str(&data?)?);
        }
        Ok(requests)
    }

    /// Open requests whose expiry lies before `now`
    pub fn open_requests_expiring_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Request>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM requests
             WHERE status = ?1 AND expires_at IS NOT NULL AND expires_at < ?2
             ORDER BY expires_at",
        )?;
        let rows = stmt.query_map(params![RequestStatus::Open, timestamp(&now)], |row| {
            row.get::<_, String>(0)
        })?;
        let mut requests = Vec::new();
        for data in rows {
            requests.push(serde_json::from_str(&data?)?);
        }
        Ok(requests)
    }

    /// Audit events of a request in the order they were written
    pub fn events_for(&self, request: &EntityId) -> Result<Vec<RequestEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT data FROM request_events WHERE request_id = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map([request], |row| row.get::<_, String>(0))?;
        let mut events = Vec::new();
        for data in rows {
            events.push(serde_json::from_str(&data?)?);
        }
        Ok(events)
    }

    pub fn indexed_document(&self, id: &EntityId) -> Result<Option<IndexDocument>, StoreError> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row("SELECT document FROM search_index WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    // =====================================================================
    // Writes
    // =====================================================================

    /// Apply a batch of operations atomically
    ///
    /// Mutations run first, in staging order, followed by index rebuilds so
    /// that search documents reflect the state written by this batch.
    pub fn apply(&self, ops: &[Operation]) -> Result<Applied, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut applied = Applied::default();

        for op in ops {
            match op {
                Operation::CommitRecord(record) => {
                    applied.records.push(write_record(&tx, record)?);
                }
                Operation::CommitRequest(request) => {
                    applied.requests.push(write_request(&tx, request)?);
                }
                Operation::DeleteRequest { id, revision } => {
                    delete_request(&tx, id, *revision)?;
                }
                Operation::AppendEvent(event) => {
                    tx.execute(
                        "INSERT INTO request_events (id, request_id, timestamp, data)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            event.id,
                            event.request_id,
                            timestamp(&event.timestamp),
                            serde_json::to_string(event)?
                        ],
                    )?;
                }
                Operation::IndexRecord(_) => {}
            }
        }

        for op in ops {
            if let Operation::IndexRecord(id) = op {
                index_record(&tx, id)?;
            }
        }

        tx.commit()?;
        Ok(applied)
    }

    /// Insert or update a single record outside of a unit of work
    pub fn save_record(&self, record: &Record) -> Result<Record, StoreError> {
        let applied = self.apply(&[
            Operation::CommitRecord(record.clone()),
            Operation::IndexRecord(record.id),
        ])?;
        applied
            .records
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound {
                kind: "record",
                id: record.id.to_string(),
            })
    }
}

fn read_record(conn: &Connection, id: &EntityId) -> Result<Option<Record>, StoreError> {
    let data: Option<String> = conn
        .query_row("SELECT data FROM records WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
}

fn stale_or_missing(
    tx: &Transaction<'_>,
    table: &str,
    kind: &'static str,
    id: &EntityId,
    expected: u32,
) -> Result<StoreError, StoreError> {
    let exists: bool = tx
        .query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table),
            [id],
            |row| row.get(0),
        )?;
    Ok(if exists {
        StoreError::Conflict {
            kind,
            id: id.to_string(),
            expected,
        }
    } else {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    })
}

/// Copy of `entity` carrying the revision it will have once written
fn next_revision<E: Entity>(entity: &E) -> E {
    let mut next = entity.clone();
    next.set_revision(entity.revision() + 1);
    next
}

fn write_record(tx: &Transaction<'_>, record: &Record) -> Result<Record, StoreError> {
    let mut next = next_revision(record);
    next.updated = Utc::now();
    let data = serde_json::to_string(&next)?;

    let changed = if record.revision == 0 {
        tx.execute(
            "INSERT OR IGNORE INTO records (id, revision, is_published, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![next.id, next.revision, next.is_published, data],
        )?
    } else {
        tx.execute(
            "UPDATE records SET revision = ?1, is_published = ?2, data = ?3
             WHERE id = ?4 AND revision = ?5",
            params![next.revision, next.is_published, data, next.id, record.revision],
        )?
    };

    if changed == 0 {
        if record.revision == 0 {
            return Err(StoreError::Conflict {
                kind: "record",
                id: record.id.to_string(),
                expected: 0,
            });
        }
        return Err(stale_or_missing(tx, "records", "record", &record.id, record.revision)?);
    }
    Ok(next)
}

fn write_request(tx: &Transaction<'_>, request: &Request) -> Result<Request, StoreError> {
    let mut next = next_revision(request);
    next.updated = Utc::now();
    let data = serde_json::to_string(&next)?;
    let expires_at = next.expires_at.as_ref().map(timestamp);

    let changed = if request.revision == 0 {
        tx.execute(
            "INSERT OR IGNORE INTO requests
             (id, revision, status, topic, receiver, expires_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                next.id,
                next.revision,
                next.status,
                next.topic.id(),
                next.receiver.id(),
                expires_at,
                data
            ],
        )?
    } else {
        tx.execute(
            "UPDATE requests SET revision = ?1, status = ?2, expires_at = ?3, data = ?4
             WHERE id = ?5 AND revision = ?6",
            params![
                next.revision,
                next.status,
                expires_at,
                data,
                next.id,
                request.revision
            ],
        )?
    };

    if changed == 0 {
        if request.revision == 0 {
            return Err(StoreError::Conflict {
                kind: "request",
                id: request.id.to_string(),
                expected: 0,
            });
        }
        return Err(stale_or_missing(tx, "requests", "request", &request.id, request.revision)?);
    }
    Ok(next)
}

fn delete_request(tx: &Transaction<'_>, id: &EntityId, revision: u32) -> Result<(), StoreError> {
    let changed = tx.execute(
        "DELETE FROM requests WHERE id = ?1 AND revision = ?2",
        params![id, revision],
    )?;
    if changed == 0 {
        return Err(stale_or_missing(tx, "requests", "request", id, revision)?);
    }
    Ok(())
}

fn index_record(tx: &Transaction<'_>, id: &EntityId) -> Result<(), StoreError> {
    let record = read_record(tx, id)?.ok_or_else(|| StoreError::NotFound {
        kind: "record",
        id: id.to_string(),
    })?;
    let document = IndexDocument::from(&record);
    tx.execute(
        "INSERT OR REPLACE INTO search_index (id, document) VALUES (?1, ?2)",
        params![id, serde_json::to_string(&document)?],
    )?;
    tracing::trace!(record = %id, revision = record.revision, "indexed record");
    Ok(())
}
