/// SQLite advisory journal: sessions and the advisories emitted in them.
///
/// Uses `rusqlite` with the `bundled` feature so SQLite is compiled in
/// and no system installation is required.
///
/// The writer runs on a dedicated `std::thread` (rusqlite::Connection is !Send
/// across await points) and receives commands via a bounded sync channel.
/// Callers hold a cheap `DbWriter` handle that is Clone + Send + Sync.
///
/// Advisory inserts and the per-session history read go through the writer
/// thread and reply over a oneshot, so a read always observes every write the
/// coach issued before it. The history report opens its own short-lived
/// read-only connection instead.
use crate::{
    engine::{AdvisoryCode, AdvisoryEvent, EventToEmit},
    models::Session,
};
use anyhow::Result;
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use std::path::Path;
use tokio::sync::oneshot;
use uuid::Uuid;

pub const DB_FILE: &str = "journal.sqlite";

// ---------------------------------------------------------------------------
// Commands sent to the writer thread
// ---------------------------------------------------------------------------

pub enum DbCommand {
    UpsertSession {
        session: Session,
    },
    InsertSessionIfAbsent {
        session: Session,
    },
    EndSession {
        session_id: Uuid,
        ended_at:   u64,
    },
    InsertAdvisory {
        reply:      oneshot::Sender<Result<i64>>,
        session_id: Uuid,
        fired_at:   u64,
        event:      EventToEmit,
    },
    RecentAdvisories {
        reply:      oneshot::Sender<Result<Vec<AdvisoryEvent>>>,
        session_id: Uuid,
        limit:      usize,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// DbWriter: cheap handle, Clone + Send + Sync
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DbWriter {
    tx: std::sync::mpsc::SyncSender<DbCommand>,
}

impl DbWriter {
    /// Insert or refresh a session row (fire-and-forget).
    pub fn upsert_session(&self, session: &Session) {
        let _ = self.tx.send(DbCommand::UpsertSession { session: session.clone() });
    }

    /// Insert a session row unless one with the same id already exists
    /// (fire-and-forget).
    pub fn insert_session_if_absent(&self, session: &Session) {
        let _ = self.tx.send(DbCommand::InsertSessionIfAbsent { session: session.clone() });
    }

    /// Stamp a session's end time (fire-and-forget).
    pub fn end_session(&self, session_id: Uuid, ended_at: u64) {
        let _ = self.tx.send(DbCommand::EndSession { session_id, ended_at });
    }

    /// Journal an emitted advisory; resolves once the row is written.
    pub async fn insert_advisory(
        &self,
        session_id: Uuid,
        fired_at:   u64,
        event:      EventToEmit,
    ) -> Result<i64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DbCommand::InsertAdvisory { reply: reply_tx, session_id, fired_at, event })
            .map_err(|_| anyhow::anyhow!("DB writer channel closed"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("DB reply channel closed"))?
    }

    /// The newest `limit` advisories for a session, oldest first.
    pub async fn recent_advisories(&self, session_id: Uuid, limit: usize) -> Result<Vec<AdvisoryEvent>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DbCommand::RecentAdvisories { reply: reply_tx, session_id, limit })
            .map_err(|_| anyhow::anyhow!("DB writer channel closed"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("DB reply channel closed"))?
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(DbCommand::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// spawn_db_writer: initialises SQLite and starts the writer thread
// ---------------------------------------------------------------------------

/// Initialise SQLite at `db_path`, apply the schema, and spawn the writer
/// thread. Returns a `DbWriter` handle that can be cloned freely.
pub fn spawn_db_writer(db_path: &Path) -> Result<DbWriter> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    apply_schema(&conn)?;

    let (tx, rx) = std::sync::mpsc::sync_channel::<DbCommand>(512);

    std::thread::spawn(move || db_writer_loop(rx, conn));

    tracing::info!("SQLite journal started at {:?}", db_path);
    Ok(DbWriter { tx })
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous   = NORMAL;

        CREATE TABLE IF NOT EXISTS sessions (
            id                       TEXT    PRIMARY KEY,
            started_at               INTEGER NOT NULL,
            ended_at                 INTEGER,
            sensitivity_mode         TEXT    NOT NULL,
            hydration_cadence        INTEGER NOT NULL,
            auto_end_timeout_minutes INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pacing_events (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT    NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            fired_at   INTEGER NOT NULL,
            event_type TEXT    NOT NULL,
            code       TEXT    NOT NULL,
            message    TEXT    NOT NULL,
            severity   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_session ON pacing_events(session_id, fired_at);
        CREATE INDEX IF NOT EXISTS idx_events_code    ON pacing_events(code);
    ")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Writer loop (runs on its own std::thread)
// ---------------------------------------------------------------------------

fn db_writer_loop(rx: std::sync::mpsc::Receiver<DbCommand>, conn: Connection) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            DbCommand::UpsertSession { session } => {
                if let Err(e) = conn.execute(
                    "INSERT INTO sessions \
                        (id, started_at, ended_at, sensitivity_mode, hydration_cadence, auto_end_timeout_minutes) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT(id) DO UPDATE SET \
                        ended_at = excluded.ended_at, \
                        sensitivity_mode = excluded.sensitivity_mode, \
                        hydration_cadence = excluded.hydration_cadence, \
                        auto_end_timeout_minutes = excluded.auto_end_timeout_minutes",
                    params![
                        session.id.to_string(),
                        session.started_at_ms as i64,
                        session.ended_at_ms.map(|t| t as i64),
                        session.sensitivity_mode.as_str(),
                        session.hydration_cadence,
                        session.auto_end_timeout_minutes,
                    ],
                ) {
                    tracing::warn!("DB upsert_session error: {}", e);
                }
            }

            DbCommand::InsertSessionIfAbsent { session } => {
                if let Err(e) = conn.execute(
                    "INSERT OR IGNORE INTO sessions \
                        (id, started_at, ended_at, sensitivity_mode, hydration_cadence, auto_end_timeout_minutes) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        session.id.to_string(),
                        session.started_at_ms as i64,
                        session.ended_at_ms.map(|t| t as i64),
                        session.sensitivity_mode.as_str(),
                        session.hydration_cadence,
                        session.auto_end_timeout_minutes,
                    ],
                ) {
                    tracing::warn!("DB insert_session_if_absent error: {}", e);
                }
            }

            DbCommand::EndSession { session_id, ended_at } => {
                if let Err(e) = conn.execute(
                    "UPDATE sessions SET ended_at = ?1 WHERE id = ?2",
                    params![ended_at as i64, session_id.to_string()],
                ) {
                    tracing::warn!("DB end_session error: {}", e);
                }
            }

            DbCommand::InsertAdvisory { reply, session_id, fired_at, event } => {
                let result = conn
                    .execute(
                        "INSERT INTO pacing_events (session_id, fired_at, event_type, code, message, severity) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            session_id.to_string(),
                            fired_at as i64,
                            event.event_type.as_str(),
                            event.code.as_str(),
                            event.message,
                            event.severity,
                        ],
                    )
                    .map(|_| conn.last_insert_rowid())
                    .map_err(anyhow::Error::from);
                let _ = reply.send(result);
            }

            DbCommand::RecentAdvisories { reply, session_id, limit } => {
                let _ = reply.send(query_recent(&conn, session_id, limit));
            }

            DbCommand::Shutdown => break,
        }
    }
    tracing::debug!("SQLite writer loop exited");
}

fn query_recent(conn: &Connection, session_id: Uuid, limit: usize) -> Result<Vec<AdvisoryEvent>> {
    let mut stmt = conn.prepare(
        "SELECT fired_at, code, severity FROM pacing_events \
         WHERE session_id = ?1 \
         ORDER BY fired_at DESC, id DESC \
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![session_id.to_string(), limit as i64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (fired_at, code, severity) = row?;
        match AdvisoryCode::from_str_opt(&code) {
            Some(code) => out.push(AdvisoryEvent {
                timestamp_ms: fired_at.max(0) as u64,
                code,
                severity:     severity.clamp(0, u8::MAX as i64) as u8,
            }),
            None => tracing::warn!("Skipping journaled advisory with unknown code '{}'", code),
        }
    }
    out.reverse();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Session history: read-only report
// ---------------------------------------------------------------------------

/// One row returned by session_history.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistoryRow {
    pub session_id:       String,
    /// Unix epoch milliseconds.
    pub started_at:       u64,
    pub ended_at:         Option<u64>,
    pub sensitivity_mode: String,
    pub advisory_count:   u32,
    pub warning_count:    u32,
}

/// The newest `limit` sessions with advisory counts, newest first.
/// Opens a read-only connection so the writer thread is never blocked.
pub fn session_history(db_path: &Path, limit: usize) -> Result<Vec<SessionHistoryRow>> {
    if !db_path.exists() {
        return Ok(vec![]);
    }

    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.started_at, s.ended_at, s.sensitivity_mode, \
                COUNT(pe.id) AS advisory_count, \
                COALESCE(SUM(CASE WHEN pe.event_type = 'warning' THEN 1 ELSE 0 END), 0) AS warning_count \
         FROM sessions s \
         LEFT JOIN pacing_events pe ON pe.session_id = s.id \
         GROUP BY s.id \
         ORDER BY s.started_at DESC \
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit as i64], |row| {
        let ended_raw: Option<i64> = row.get(2)?;
        Ok(SessionHistoryRow {
            session_id:       row.get(0)?,
            started_at:       row.get::<_, i64>(1)? as u64,
            ended_at:         ended_raw.map(|v| v as u64),
            sensitivity_mode: row.get(3)?,
            advisory_count:   row.get::<_, i64>(4)? as u32,
            warning_count:    row.get::<_, i64>(5)? as u32,
        })
    })?;

    rows.collect::<Result<Vec<_>, _>>().map_err(anyhow::Error::from)
}
