//! Severity-scaled notification text.
//!
//! Red alerts carry every triggering reading and reason, yellow alerts a
//! short sample, green alerts a single line of reassurance. The output is
//! a pure function of the alert record.

use vitalwatch_common::types::{AlertRecord, AlertVariable, Severity};

pub const RED_PREFIX: &str = "🔴 URGENT ACTION REQUIRED";
pub const YELLOW_PREFIX: &str = "🟡 ATTENTION NEEDED";
pub const GREEN_PREFIX: &str = "🟢 ROUTINE CHECK";
pub const GREEN_REASSURANCE: &str = "No immediate concerns. Continue routine monitoring.";
pub const RED_SUFFIX: &str = "This patient requires immediate clinical attention.";

const YELLOW_VARIABLE_LIMIT: usize = 3;
const YELLOW_REASON_LIMIT: usize = 2;

pub fn prefix(severity: Severity) -> &'static str {
    match severity {
        Severity::Red => RED_PREFIX,
        Severity::Yellow => YELLOW_PREFIX,
        Severity::Green => GREEN_PREFIX,
    }
}

/// Readings to surface for the alert's severity.
pub fn select_variables(alert: &AlertRecord) -> Vec<&AlertVariable> {
    match alert.severity {
        Severity::Red => alert
            .variables
            .iter()
            .filter(|v| alert.alert_reasons.iter().any(|r| r.contains(&v.name)))
            .collect(),
        Severity::Yellow => alert.variables.iter().take(YELLOW_VARIABLE_LIMIT).collect(),
        Severity::Green => alert.variables.iter().take(1).collect(),
    }
}

/// Reasons to surface for the alert's severity.
pub fn select_reasons(alert: &AlertRecord) -> Vec<&str> {
    match alert.severity {
        Severity::Red => alert
            .alert_reasons
            .iter()
            .filter(|r| r.contains("CRITICAL"))
            .map(String::as_str)
            .collect(),
        Severity::Yellow => alert
            .alert_reasons
            .iter()
            .take(YELLOW_REASON_LIMIT)
            .map(String::as_str)
            .collect(),
        Severity::Green => vec![GREEN_REASSURANCE],
    }
}

pub fn format_message(alert: &AlertRecord) -> String {
    let mut lines = vec![prefix(alert.severity).to_string()];

    if alert.age > 0 {
        lines.push(format!("Patient: {} ({}y)", alert.patient_name, alert.age));
    } else {
        lines.push(format!("Patient: {}", alert.patient_name));
    }

    for variable in select_variables(alert) {
        lines.push(format!("{}: {}", variable.name, variable.value));
    }

    let reasons = select_reasons(alert);
    if !reasons.is_empty() {
        lines.push(format!("Reasons: {}", reasons.join("; ")));
    }

    if alert.severity == Severity::Red {
        lines.push(RED_SUFFIX.to_string());
    }

    lines.join("\n")
}
