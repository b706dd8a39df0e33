use crate::error::StorageError;
use crate::schema;
use crate::{DispatchLogRow, DispatchStatus, TriageStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use vitalwatch_common::id::next_id;
use vitalwatch_common::types::{
    BatchContext, HealthStatus, NewTelemetryRecord, Severity, TelemetryPayload, TelemetryRecord,
};

/// SQLite-backed [`TriageStore`].
///
/// A single connection guarded by a mutex; every operation is a short
/// synchronous statement, so handlers never hold the lock across an await.
pub struct SqliteTriageStore {
    conn: Mutex<Connection>,
}

impl SqliteTriageStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::apply(&conn)?;
        tracing::info!(path = %path.display(), "Opened triage database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.lock_conn();
        f(&conn)
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<BatchContext> {
    Ok(BatchContext {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: from_millis(row.get(2)?),
    })
}

fn telemetry_from_row(row: &Row<'_>) -> rusqlite::Result<TelemetryRecord> {
    let id: String = row.get(1)?;
    let raw_status: Option<String> = row.get(8)?;
    let raw_payload: String = row.get(9)?;

    let health_status = raw_status.and_then(|s| match s.parse::<HealthStatus>() {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(record_id = %id, error = %e, "Ignoring stored health status");
            None
        }
    });
    let payload = serde_json::from_str::<TelemetryPayload>(&raw_payload).unwrap_or_else(|e| {
        tracing::warn!(record_id = %id, error = %e, "Stored payload is unreadable, using empty payload");
        TelemetryPayload::default()
    });

    Ok(TelemetryRecord {
        sequence: row.get(0)?,
        id,
        batch_id: row.get(2)?,
        patient_id: row.get(3)?,
        name: row.get(4)?,
        age: row.get(5)?,
        condition: row.get(6)?,
        is_alert: row.get::<_, i64>(7)? != 0,
        health_status,
        payload,
        created_at: from_millis(row.get(10)?),
    })
}

fn dispatch_from_row(row: &Row<'_>) -> rusqlite::Result<DispatchLogRow> {
    let id: String = row.get(0)?;
    let raw_severity: String = row.get(4)?;
    let raw_status: String = row.get(7)?;
    Ok(DispatchLogRow {
        severity: raw_severity.parse().unwrap_or_else(|e: String| {
            tracing::warn!(dispatch_id = %id, error = %e, "Unknown stored severity");
            Severity::Green
        }),
        status: raw_status.parse().unwrap_or_else(|e: String| {
            tracing::warn!(dispatch_id = %id, error = %e, "Unknown stored dispatch status");
            DispatchStatus::Failed
        }),
        id,
        alert_id: row.get(1)?,
        patient_id: row.get(2)?,
        batch_id: row.get(3)?,
        destination: row.get(5)?,
        channel_type: row.get(6)?,
        channel_message_id: row.get(8)?,
        error: row.get(9)?,
        created_at: from_millis(row.get(10)?),
    })
}

const TELEMETRY_COLUMNS: &str = "seq, id, batch_id, patient_id, name, age, condition_text, \
     is_alert, health_status, payload, created_at";

const DISPATCH_COLUMNS: &str = "id, alert_id, patient_id, batch_id, severity, destination, \
     channel_type, status, channel_message_id, error, created_at";

#[async_trait]
impl TriageStore for SqliteTriageStore {
    async fn create_batch(&self, name: &str) -> Result<BatchContext> {
        let batch = BatchContext {
            id: next_id(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO batches (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![batch.id, batch.name, batch.created_at.timestamp_millis()],
            )?;
            Ok(())
        })?;
        tracing::info!(batch_id = %batch.id, name = %batch.name, "Created batch");
        Ok(batch)
    }

    async fn insert_records(
        &self,
        batch_id: &str,
        records: &[NewTelemetryRecord],
    ) -> Result<usize> {
        let inserted = self.with_conn(|conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT id FROM batches WHERE id = ?1",
                    params![batch_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::NotFound {
                    entity: "batch",
                    id: batch_id.to_string(),
                }
                .into());
            }

            let now = Utc::now();
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO telemetry_records (id, batch_id, patient_id, name, age, \
                     condition_text, is_alert, health_status, payload, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for record in records {
                    let payload = serde_json::to_string(&record.payload)
                        .map_err(StorageError::from)?;
                    stmt.execute(params![
                        next_id(),
                        batch_id,
                        record.patient_id,
                        record.name,
                        record.age,
                        record.condition,
                        record.is_alert as i64,
                        record.health_status.map(|s| s.to_string()),
                        payload,
                        record.created_at.unwrap_or(now).timestamp_millis(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })?;
        tracing::debug!(batch_id = %batch_id, count = inserted, "Stored telemetry records");
        Ok(inserted)
    }

    async fn list_batches(&self, limit: usize, offset: usize) -> Result<Vec<BatchContext>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at FROM batches \
                 ORDER BY created_at DESC, seq DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(params![limit as i64, offset as i64], batch_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    async fn most_recent_batch_id(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT id FROM batches ORDER BY created_at DESC, seq DESC LIMIT 1",
                    [],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(id)
        })
    }

    async fn list_telemetry_records(&self, batch_id: Option<&str>) -> Result<Vec<TelemetryRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {TELEMETRY_COLUMNS} FROM telemetry_records \
                 WHERE (?1 IS NULL OR batch_id = ?1) ORDER BY seq ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![batch_id], telemetry_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    async fn batch_id_for_record(&self, record_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let batch_id = conn
                .query_row(
                    "SELECT batch_id FROM telemetry_records WHERE id = ?1",
                    params![record_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(batch_id)
        })
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    async fn record_dispatch(&self, row: &DispatchLogRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO alert_dispatches (id, alert_id, patient_id, batch_id, severity, \
                 destination, channel_type, status, channel_message_id, error, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.id,
                    row.alert_id,
                    row.patient_id,
                    row.batch_id,
                    row.severity.to_string(),
                    row.destination,
                    row.channel_type,
                    row.status.to_string(),
                    row.channel_message_id,
                    row.error,
                    row.created_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
    }

    async fn list_dispatches(
        &self,
        patient_id: Option<&str>,
        batch_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DispatchLogRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {DISPATCH_COLUMNS} FROM alert_dispatches \
                 WHERE (?1 IS NULL OR patient_id = ?1) AND (?2 IS NULL OR batch_id = ?2) \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![patient_id, batch_id, limit as i64], dispatch_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
