use rusqlite::Connection;

pub(crate) const BATCHES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS batches (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_batches_time ON batches(created_at);
";

pub(crate) const TELEMETRY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS telemetry_records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    batch_id TEXT NOT NULL,
    patient_id TEXT NOT NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL DEFAULT 0,
    condition_text TEXT NOT NULL DEFAULT '',
    is_alert INTEGER NOT NULL DEFAULT 0,
    health_status TEXT,
    payload TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_telemetry_batch ON telemetry_records(batch_id);
CREATE INDEX IF NOT EXISTS idx_telemetry_patient ON telemetry_records(patient_id, batch_id);
";

pub(crate) const SETTINGS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

pub(crate) const DISPATCH_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alert_dispatches (
    id TEXT PRIMARY KEY,
    alert_id TEXT NOT NULL,
    patient_id TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    destination TEXT NOT NULL,
    channel_type TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    channel_message_id TEXT,
    error TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dispatches_patient ON alert_dispatches(patient_id, batch_id);
CREATE INDEX IF NOT EXISTS idx_dispatches_time ON alert_dispatches(created_at);
";

pub(crate) fn apply(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(BATCHES_SCHEMA)?;
    conn.execute_batch(TELEMETRY_SCHEMA)?;
    conn.execute_batch(SETTINGS_SCHEMA)?;
    conn.execute_batch(DISPATCH_SCHEMA)?;
    Ok(())
}
