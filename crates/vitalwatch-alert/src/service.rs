use crate::engine::TriageEngine;
use anyhow::Result;
use std::sync::Arc;
use vitalwatch_common::types::AlertRecord;
use vitalwatch_storage::TriageStore;

/// Reads telemetry from the store and builds alert sets on demand.
///
/// Nothing is cached between calls: a list followed by a send sees
/// whatever the store holds at the time of each call.
#[derive(Clone)]
pub struct TriageService {
    store: Arc<dyn TriageStore>,
    engine: Arc<TriageEngine>,
}

impl TriageService {
    pub fn new(store: Arc<dyn TriageStore>, engine: Arc<TriageEngine>) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<dyn TriageStore> {
        &self.store
    }

    /// Alert set for `batch_id`, or for the most recently created batch.
    ///
    /// Returns an empty list when no batch exists yet.
    pub async fn list_alerts(&self, batch_id: Option<&str>) -> Result<Vec<AlertRecord>> {
        let batch_id = match batch_id {
            Some(id) => id.to_string(),
            None => match self.store.most_recent_batch_id().await? {
                Some(id) => id,
                None => {
                    tracing::debug!("No batches ingested yet");
                    return Ok(Vec::new());
                }
            },
        };
        let records = self.store.list_telemetry_records(Some(&batch_id)).await?;
        Ok(self.engine.build_alert_set(records))
    }

    /// Recomputes the alert set of the batch the alert came from and
    /// returns the alert with this id, if it is still current.
    ///
    /// An alert id whose row has since been superseded by a newer row for
    /// the same patient no longer resolves.
    pub async fn find_alert(&self, alert_id: &str) -> Result<Option<AlertRecord>> {
        let Some(record_id) = alert_id.strip_prefix("alert-") else {
            return Ok(None);
        };
        let Some(batch_id) = self.store.batch_id_for_record(record_id).await? else {
            return Ok(None);
        };
        let alerts = self.list_alerts(Some(&batch_id)).await?;
        Ok(alerts.into_iter().find(|a| a.alert_id == alert_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::threshold::ThresholdTable;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use vitalwatch_common::types::{
        NewTelemetryRecord, Reading, Severity, TelemetryPayload, VariableReading,
    };
    use vitalwatch_storage::engine::SqliteTriageStore;

    fn record(patient_id: &str, glucose: f64, secs_ago: i64) -> NewTelemetryRecord {
        NewTelemetryRecord {
            patient_id: patient_id.to_string(),
            name: format!("Patient {patient_id}"),
            age: 58,
            condition: "Diabetes".to_string(),
            is_alert: false,
            health_status: None,
            payload: TelemetryPayload {
                variables: vec![VariableReading {
                    name: "glucose".to_string(),
                    value: Reading::Numeric(glucose),
                }],
                ..Default::default()
            },
            created_at: Some(Utc::now() - Duration::seconds(secs_ago)),
        }
    }

    fn service(tmp: &TempDir) -> TriageService {
        let store = SqliteTriageStore::new(&tmp.path().join("triage.db")).unwrap();
        TriageService::new(
            Arc::new(store),
            Arc::new(TriageEngine::new(ThresholdTable::standard())),
        )
    }

    #[tokio::test]
    async fn list_alerts_without_batches_is_empty() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        assert!(svc.list_alerts(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_alerts_defaults_to_latest_batch() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);

        let old = svc.store().create_batch("old").await.unwrap();
        svc.store()
            .insert_records(&old.id, &[record("p1", 320.0, 60)])
            .await
            .unwrap();
        let new = svc.store().create_batch("new").await.unwrap();
        svc.store()
            .insert_records(&new.id, &[record("p2", 110.0, 10), record("p3", 190.0, 10)])
            .await
            .unwrap();

        let latest = svc.list_alerts(None).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|a| a.batch_id == new.id));
        assert_eq!(latest[0].severity, Severity::Yellow);
        assert_eq!(latest[1].severity, Severity::Green);

        let older = svc.list_alerts(Some(&old.id)).await.unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].severity, Severity::Red);
    }

    #[tokio::test]
    async fn find_alert_in_older_batch() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);

        let old = svc.store().create_batch("old").await.unwrap();
        svc.store()
            .insert_records(&old.id, &[record("p1", 320.0, 60)])
            .await
            .unwrap();
        let _new = svc.store().create_batch("new").await.unwrap();

        let alerts = svc.list_alerts(Some(&old.id)).await.unwrap();
        let found = svc.find_alert(&alerts[0].alert_id).await.unwrap().unwrap();
        assert_eq!(found.patient_id, "p1");
        assert!(found.message.starts_with("🔴"));
    }

    #[tokio::test]
    async fn superseded_alert_id_does_not_resolve() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);

        let batch = svc.store().create_batch("b").await.unwrap();
        svc.store()
            .insert_records(&batch.id, &[record("p1", 110.0, 60), record("p1", 320.0, 5)])
            .await
            .unwrap();

        let rows = svc.store().list_telemetry_records(Some(&batch.id)).await.unwrap();
        let stale = format!("alert-{}", rows[0].id);
        let current = format!("alert-{}", rows[1].id);

        assert!(svc.find_alert(&stale).await.unwrap().is_none());
        let alert = svc.find_alert(&current).await.unwrap().unwrap();
        assert_eq!(alert.severity, Severity::Red);
        assert!(svc.find_alert("bogus").await.unwrap().is_none());
        assert!(svc.find_alert("alert-missing").await.unwrap().is_none());
    }
}
