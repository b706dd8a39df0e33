//! Validation of loosely typed telemetry rows.
//!
//! Upload tooling hands over JSON rows whose shape drifts: ids may be
//! numbers, `isAlert` may be `"yes"`, `rawData` may be an object or a
//! string containing one. [`IngestRecord::validate`] maps all of that onto
//! [`NewTelemetryRecord`] exactly once.

use crate::error::{ParseError, Result};
use crate::types::{
    HealthStatus, NewTelemetryRecord, Reading, TelemetryPayload, VariableReading,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// A telemetry row as produced by spreadsheet parsing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRecord {
    #[serde(default)]
    pub patient_id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Value,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub is_alert: Value,
    #[serde(default)]
    pub health_status: Option<String>,
    #[serde(default)]
    pub raw_data: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl IngestRecord {
    pub fn validate(self) -> Result<NewTelemetryRecord> {
        let patient_id = match &self.patient_id {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return Err(ParseError::MissingField("patientId")),
        };

        let age = parse_age(&self.age)?;

        let health_status = match self.health_status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<HealthStatus>()
                    .map_err(|e| ParseError::invalid("healthStatus", e))?,
            ),
        };

        let payload = parse_payload(self.raw_data)?;

        Ok(NewTelemetryRecord {
            patient_id,
            name: self.name.unwrap_or_default().trim().to_string(),
            age,
            condition: self.condition.unwrap_or_default().trim().to_string(),
            is_alert: truthy(&self.is_alert),
            health_status,
            payload,
            created_at: self.created_at,
        })
    }
}

/// Validates every row, logging and dropping the ones that fail.
pub fn validate_all(rows: Vec<IngestRecord>) -> Vec<NewTelemetryRecord> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| match row.validate() {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(row = index, error = %e, "Skipping invalid telemetry row");
                None
            }
        })
        .collect()
}

fn parse_age(value: &Value) -> Result<i32> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_f64()
            .filter(|v| (0.0..=200.0).contains(v))
            .map(|v| v as i32)
            .ok_or_else(|| ParseError::invalid("age", format!("out of range: {n}"))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| (0.0..=200.0).contains(v))
            .map(|v| v as i32)
            .ok_or_else(|| ParseError::invalid("age", format!("not a number: {s}"))),
        other => Err(ParseError::invalid("age", format!("unexpected type: {other}"))),
    }
}

/// Interprets boolean-ish flags: `true`, non-zero numbers and the strings
/// `true`/`yes`/`y`/`1` are truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "1"
        ),
        _ => false,
    }
}

fn parse_payload(raw: Value) -> Result<TelemetryPayload> {
    let raw = match raw {
        Value::Null => return Ok(TelemetryPayload::default()),
        Value::String(s) if s.trim().is_empty() => return Ok(TelemetryPayload::default()),
        Value::String(s) => serde_json::from_str::<Value>(&s)?,
        other => other,
    };

    let Value::Object(mut map) = raw else {
        return Err(ParseError::invalid("rawData", "expected an object"));
    };

    let variables = match map.remove("variables") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(vars)) => vars
            .into_iter()
            .filter_map(|(name, value)| match parse_reading(&name, value) {
                Ok(reading) => reading.map(|value| VariableReading { name, value }),
                Err(e) => {
                    tracing::warn!(variable = %name, error = %e, "Skipping unreadable variable");
                    None
                }
            })
            .collect(),
        Some(_) => return Err(ParseError::invalid("rawData.variables", "expected an object")),
    };

    Ok(TelemetryPayload {
        variables,
        issues: string_list(map.remove("issues"), "rawData.issues")?,
        alert_reasons: string_list(map.remove("alertReasons"), "rawData.alertReasons")?,
    })
}

fn parse_reading(name: &str, value: Value) -> Result<Option<Reading>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(|v| Some(Reading::Numeric(v)))
            .ok_or_else(|| ParseError::invalid(name, "number out of range")),
        Value::String(s) => Ok(Some(Reading::from_text(&s))),
        Value::Bool(b) => Ok(Some(Reading::Text(b.to_string()))),
        Value::Array(_) | Value::Object(_) => {
            Err(ParseError::invalid(name, "nested values are not readings"))
        }
    }
}

fn string_list(value: Option<Value>, field: &str) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s]),
        Some(Value::Array(items)) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect()),
        Some(_) => Err(ParseError::invalid(field, "expected a list of strings")),
    }
}
