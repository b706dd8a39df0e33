use crate::aggregator::aggregate;
use crate::formatter::format_message;
use crate::rules::threshold::ThresholdTable;
use vitalwatch_common::types::{AlertRecord, TelemetryRecord};

/// Builds ordered alert sets from telemetry rows.
///
/// The engine holds no per-request state: every call recomputes from the
/// rows it is given, so concurrent callers never share results.
pub struct TriageEngine {
    table: ThresholdTable,
}

impl TriageEngine {
    pub fn new(table: ThresholdTable) -> Self {
        Self { table }
    }

    /// Classifies, collapses per patient, sorts red → yellow → green (stable)
    /// and renders each alert's message.
    pub fn build_alert_set(&self, records: Vec<TelemetryRecord>) -> Vec<AlertRecord> {
        let row_count = records.len();
        let mut alerts = aggregate(records, &self.table);
        alerts.sort_by_key(|a| a.severity.rank());

        for alert in &mut alerts {
            alert.alert_count = alert.alert_reasons.len();
            alert.message = format_message(alert);
        }

        tracing::debug!(rows = row_count, alerts = alerts.len(), "Built alert set");
        alerts
    }
}

impl Default for TriageEngine {
    fn default() -> Self {
        Self::new(ThresholdTable::standard())
    }
}
