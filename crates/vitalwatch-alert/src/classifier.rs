use crate::rules::threshold::{normalize_name, ThresholdTable};
use vitalwatch_common::types::{
    format_number, AlertStatus, HealthStatus, Severity, TelemetryRecord, VariableReading,
};

pub const NORMAL_REASON: &str = "All readings within normal range";
pub const HEALTHY_OVERRIDE_REASON: &str = "Marked healthy by care team";
pub const FLAGGED_REASON: &str = "Flagged for review at ingestion";

const ESCALATING_KEYWORDS: [&str; 3] = ["critical", "severe", "emergency"];
const IDENTITY_FIELDS: [&str; 4] = ["patientid", "name", "age", "condition"];

/// Outcome of classifying a single telemetry row.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub severity: Severity,
    pub reasons: Vec<String>,
    /// Whether any numeric reading fell in a red or yellow band.
    pub has_abnormal_value: bool,
    pub status: AlertStatus,
}

/// Identity columns sometimes leak into the variables map; they are never
/// readings.
pub fn is_identity_field(variable_name: &str) -> bool {
    let normalized = normalize_name(variable_name);
    IDENTITY_FIELDS.contains(&normalized.as_str())
}

/// Variables that carry readings, in payload order.
pub fn readings(record: &TelemetryRecord) -> impl Iterator<Item = &VariableReading> {
    record
        .payload
        .variables
        .iter()
        .filter(|v| !is_identity_field(&v.name))
}

/// Classifies one telemetry row.
///
/// Precedence, strongest first: an explicit `healthy` status, threshold
/// bands, pre-computed upstream reasons, the `is_alert` flag, and finally
/// green. Within the threshold step severity only ever escalates.
pub fn classify(record: &TelemetryRecord, table: &ThresholdTable) -> Classification {
    let mut severity = Severity::Green;
    let mut reasons = Vec::new();
    let mut has_abnormal_value = false;

    for variable in readings(record) {
        let Some(value) = variable.value.as_number() else {
            continue;
        };
        match table.evaluate(&variable.name, value) {
            Some(Severity::Red) => {
                severity = severity.escalate(Severity::Red);
                reasons.push(format!(
                    "CRITICAL: {} is {}",
                    variable.name,
                    format_number(value)
                ));
                has_abnormal_value = true;
            }
            Some(Severity::Yellow) => {
                severity = severity.escalate(Severity::Yellow);
                reasons.push(format!(
                    "WARNING: {} is {}",
                    variable.name,
                    format_number(value)
                ));
                has_abnormal_value = true;
            }
            Some(Severity::Green) | None => {}
        }
    }

    if !has_abnormal_value {
        let upstream: Vec<String> = record
            .payload
            .alert_reasons
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();

        if upstream.is_empty() {
            reasons.push(NORMAL_REASON.to_string());
        } else {
            severity = if upstream.iter().any(|r| is_escalating(r)) {
                Severity::Red
            } else {
                Severity::Yellow
            };
            reasons = upstream;
        }
    }

    if record.health_status == Some(HealthStatus::Healthy) {
        return Classification {
            severity: Severity::Green,
            reasons: vec![HEALTHY_OVERRIDE_REASON.to_string()],
            has_abnormal_value,
            status: AlertStatus::Healthy,
        };
    }

    if record.is_alert && severity == Severity::Green {
        severity = Severity::Yellow;
        reasons = vec![FLAGGED_REASON.to_string()];
    }

    let status = if severity == Severity::Green {
        AlertStatus::Healthy
    } else {
        AlertStatus::Pending
    };

    Classification {
        severity,
        reasons,
        has_abnormal_value,
        status,
    }
}

fn is_escalating(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    ESCALATING_KEYWORDS.iter().any(|k| lower.contains(k))
}
