use crate::classifier::{classify, readings, Classification};
use crate::rules::threshold::ThresholdTable;
use std::collections::HashMap;
use vitalwatch_common::types::{alert_id_for, AlertRecord, AlertVariable, TelemetryRecord};

/// Collapses telemetry rows into one alert record per patient.
///
/// Rows are ordered by `(created_at, sequence)` before collapsing, and the
/// last row visited for a patient replaces any earlier one, so the newest
/// row wins regardless of storage order. Output order is the order in
/// which each patient first appears in that sequence.
///
/// `message` is left empty; the engine renders it after sorting.
pub fn aggregate(mut records: Vec<TelemetryRecord>, table: &ThresholdTable) -> Vec<AlertRecord> {
    records.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.sequence.cmp(&b.sequence))
    });

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut alerts: Vec<AlertRecord> = Vec::new();

    for record in &records {
        let classification = classify(record, table);
        let alert = to_alert_record(record, classification);
        match index.get(&record.patient_id) {
            Some(&slot) => {
                tracing::debug!(
                    patient_id = %record.patient_id,
                    replaced = %alerts[slot].alert_id,
                    kept = %alert.alert_id,
                    "Collapsed duplicate telemetry row"
                );
                alerts[slot] = alert;
            }
            None => {
                index.insert(record.patient_id.clone(), alerts.len());
                alerts.push(alert);
            }
        }
    }

    alerts
}

fn to_alert_record(record: &TelemetryRecord, classification: Classification) -> AlertRecord {
    let variables = readings(record)
        .map(|v| AlertVariable {
            name: v.name.clone(),
            value: v.value.clone(),
            timestamp: record.created_at,
        })
        .collect();

    AlertRecord {
        alert_id: alert_id_for(&record.id),
        patient_id: record.patient_id.clone(),
        patient_name: record.name.clone(),
        age: record.age,
        condition: record.condition.clone(),
        batch_id: record.batch_id.clone(),
        severity: classification.severity,
        alert_count: classification.reasons.len(),
        alert_reasons: classification.reasons,
        variables,
        status: classification.status,
        message: String::new(),
        created_at: record.created_at,
    }
}
