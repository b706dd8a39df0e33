use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Triage severity, ordered from most to least urgent.
///
/// The derived ordering is the escalation order: `Red < Yellow < Green`,
/// so the more urgent of two levels is their minimum and an ascending sort
/// puts red alerts first.
///
/// # Examples
///
/// ```
/// use vitalwatch_common::types::Severity;
///
/// let sev: Severity = "yellow".parse().unwrap();
/// assert_eq!(sev, Severity::Yellow);
/// assert_eq!(sev.to_string(), "yellow");
/// assert!(Severity::Red < Severity::Green);
/// assert_eq!(Severity::Yellow.escalate(Severity::Red), Severity::Red);
/// assert_eq!(Severity::Red.escalate(Severity::Yellow), Severity::Red);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Red,
    Yellow,
    Green,
}

impl Severity {
    /// Sort rank: red=0, yellow=1, green=2.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Red => 0,
            Severity::Yellow => 1,
            Severity::Green => 2,
        }
    }

    /// Returns the more urgent of the two levels. Never downgrades.
    pub fn escalate(self, other: Severity) -> Severity {
        self.min(other)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Red => write!(f, "red"),
            Severity::Yellow => write!(f, "yellow"),
            Severity::Green => write!(f, "green"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "red" => Ok(Severity::Red),
            "yellow" => Ok(Severity::Yellow),
            "green" => Ok(Severity::Green),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Explicit health status set on a telemetry row by upstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Alert,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Alert => write!(f, "alert"),
        }
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "alert" => Ok(HealthStatus::Alert),
            _ => Err(format!("unknown health status: {s}")),
        }
    }
}

/// A single variable reading. Only numeric readings take part in
/// threshold evaluation.
///
/// # Examples
///
/// ```
/// use vitalwatch_common::types::Reading;
///
/// assert_eq!(Reading::Numeric(320.0).as_number(), Some(320.0));
/// assert_eq!(Reading::Text("185/95".into()).as_number(), Some(185.0));
/// assert_eq!(Reading::Text("stable".into()).as_number(), None);
/// assert_eq!(Reading::Numeric(320.0).to_string(), "320");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Reading {
    Numeric(f64),
    Text(String),
}

impl Reading {
    /// Builds a reading from raw text: fully numeric text becomes
    /// [`Reading::Numeric`], anything else is kept verbatim.
    pub fn from_text(raw: &str) -> Reading {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Reading::Numeric(v),
            _ => Reading::Text(raw.to_string()),
        }
    }

    /// Numeric value of this reading, if it has one.
    ///
    /// Text readings that start with a number followed by a unit or a
    /// second component (`"101.2F"`, `"185/95"`) yield that leading number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Reading::Numeric(v) => Some(*v),
            Reading::Text(s) => leading_number(s),
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reading::Numeric(v) => write!(f, "{}", format_number(*v)),
            Reading::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Formats a reading value, dropping the fractional part of integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    let mut digits = 0;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => digits += 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if digits == 0 {
        return None;
    }
    s[..end].trim_end_matches('.').parse::<f64>().ok()
}

/// A named variable reading from a telemetry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VariableReading {
    pub name: String,
    pub value: Reading,
}

/// Typed telemetry payload, validated once at ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Readings in their original order.
    #[serde(default)]
    pub variables: Vec<VariableReading>,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Reasons pre-computed by upstream tooling.
    #[serde(default)]
    pub alert_reasons: Vec<String>,
}

/// A validated telemetry row ready to be stored in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTelemetryRecord {
    pub patient_id: String,
    pub name: String,
    pub age: i32,
    pub condition: String,
    pub is_alert: bool,
    pub health_status: Option<HealthStatus>,
    pub payload: TelemetryPayload,
    /// Upstream observation time; the store uses ingestion time when absent.
    pub created_at: Option<DateTime<Utc>>,
}

/// A stored telemetry row.
///
/// `(patient_id, batch_id)` is not unique: a batch may hold several rows
/// for the same patient. `(created_at, sequence)` orders rows by recency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: String,
    pub batch_id: String,
    pub patient_id: String,
    pub name: String,
    pub age: i32,
    pub condition: String,
    pub created_at: DateTime<Utc>,
    /// Monotonic insertion counter assigned by the store.
    pub sequence: i64,
    pub is_alert: bool,
    pub health_status: Option<HealthStatus>,
    pub payload: TelemetryPayload,
}

/// A batch of telemetry ingested together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchContext {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Healthy,
}

/// A reading as surfaced on an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlertVariable {
    pub name: String,
    pub value: Reading,
    pub timestamp: DateTime<Utc>,
}

/// The per-patient triage decision derived from telemetry.
///
/// Alert records are recomputed on every request and never stored, so
/// `alert_id` is only as stable as the row it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// `alert-<recordId>`
    pub alert_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub age: i32,
    pub condition: String,
    pub batch_id: String,
    pub severity: Severity,
    pub alert_reasons: Vec<String>,
    pub variables: Vec<AlertVariable>,
    pub status: AlertStatus,
    pub message: String,
    pub alert_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Builds the alert id for a telemetry row id.
pub fn alert_id_for(record_id: &str) -> String {
    format!("alert-{record_id}")
}
