use crate::aggregator::aggregate;
use crate::classifier::{
    classify, FLAGGED_REASON, HEALTHY_OVERRIDE_REASON, NORMAL_REASON,
};
use crate::engine::TriageEngine;
use crate::formatter::{format_message, GREEN_REASSURANCE, RED_PREFIX, RED_SUFFIX, YELLOW_PREFIX};
use crate::rules::threshold::{Bound, CompareOp, ThresholdTable, VitalRule};
use chrono::{Duration, Utc};
use vitalwatch_common::types::{
    AlertStatus, HealthStatus, Reading, Severity, TelemetryPayload, TelemetryRecord,
    VariableReading,
};

fn make_record(id: &str, patient: &str, vars: &[(&str, Reading)], secs_ago: i64) -> TelemetryRecord {
    TelemetryRecord {
        id: id.to_string(),
        batch_id: "batch-1".to_string(),
        patient_id: patient.to_string(),
        name: format!("Patient {patient}"),
        age: 70,
        condition: "Hypertension".to_string(),
        created_at: Utc::now() - Duration::seconds(secs_ago),
        sequence: 0,
        is_alert: false,
        health_status: None,
        payload: TelemetryPayload {
            variables: vars
                .iter()
                .map(|(name, value)| VariableReading {
                    name: name.to_string(),
                    value: value.clone(),
                })
                .collect(),
            issues: Vec::new(),
            alert_reasons: Vec::new(),
        },
    }
}

fn num(v: f64) -> Reading {
    Reading::Numeric(v)
}

// ---- threshold table ----

#[test]
fn standard_table_bands() {
    let table = ThresholdTable::standard();
    let cases = [
        ("glucose", 301.0, Some(Severity::Red)),
        ("glucose", 300.0, Some(Severity::Yellow)),
        ("glucose", 65.0, Some(Severity::Yellow)),
        ("bloodPressure", 181.0, Some(Severity::Red)),
        ("bloodPressure", 141.0, Some(Severity::Yellow)),
        ("bloodPressure", 120.0, None),
        ("heartRate", 151.0, Some(Severity::Red)),
        ("heartRate", 39.0, Some(Severity::Red)),
        ("heartRate", 45.0, Some(Severity::Yellow)),
        ("heartRate", 72.0, None),
        ("temperature", 103.5, Some(Severity::Red)),
        ("temperature", 100.0, Some(Severity::Yellow)),
        ("temperature", 96.5, Some(Severity::Yellow)),
        ("temperature", 98.6, None),
        ("oxygenSaturation", 84.0, Some(Severity::Red)),
        ("SpO2", 90.0, Some(Severity::Yellow)),
        ("spo2", 97.0, None),
    ];
    for (name, value, expected) in cases {
        assert_eq!(table.evaluate(name, value), expected, "{name}={value}");
    }
}

#[test]
fn variable_names_match_case_and_punctuation_insensitively() {
    let table = ThresholdTable::standard();
    assert_eq!(table.rule_for("Heart Rate").unwrap().label, "heart_rate");
    assert_eq!(table.rule_for("heart_rate_bpm").unwrap().label, "heart_rate");
    assert_eq!(table.rule_for("BLOOD_PRESSURE").unwrap().label, "blood_pressure");
    assert_eq!(table.rule_for("body temp").unwrap().label, "temperature");
    assert_eq!(table.rule_for("pulseOx").unwrap().label, "oxygen_saturation");
    assert_eq!(table.rule_for("pulse_ox").unwrap().label, "oxygen_saturation");
    assert_eq!(table.rule_for("PulseOximetry").unwrap().label, "oxygen_saturation");
    assert_eq!(table.rule_for("O2 Sat").unwrap().label, "oxygen_saturation");
    assert_eq!(table.rule_for("pulse").unwrap().label, "heart_rate");
    assert!(table.rule_for("oxygenFlowRate").is_none());
    assert!(table.rule_for("weight").is_none());
}

#[test]
fn pulse_oximetry_is_judged_as_oxygen_saturation() {
    let table = ThresholdTable::standard();
    assert_eq!(table.evaluate("pulseOx", 80.0), Some(Severity::Red));
    assert_eq!(table.evaluate("pulse_ox", 90.0), Some(Severity::Yellow));
    assert_eq!(table.evaluate("pulseOx", 97.0), None);
    assert_eq!(table.evaluate("oxygenFlowRate", 2.0), None);
}

#[test]
fn table_loads_from_json() {
    let table = ThresholdTable::from_json(
        r#"[{"label":"respiration","patterns":["Resp Rate"],
             "red":[{"op":"gt","value":30}],
             "yellow":[{"op":"greater_equal","value":24}]}]"#,
    )
    .unwrap();
    assert_eq!(table.rules().len(), 1);
    assert_eq!(table.rules()[0].patterns, vec!["resprate"]);
    assert_eq!(table.evaluate("respRate", 31.0), Some(Severity::Red));
    assert_eq!(table.evaluate("respRate", 24.0), Some(Severity::Yellow));
    assert_eq!(table.evaluate("glucose", 400.0), None);
}

#[test]
fn table_rejects_rule_without_patterns() {
    let err = ThresholdTable::from_json(r#"[{"label":"x","patterns":[]}]"#).unwrap_err();
    assert!(err.to_string().contains("no patterns"));
}

#[test]
fn custom_rule_evaluates_red_before_yellow() {
    let rule = VitalRule {
        label: "score".into(),
        patterns: vec!["score".into()],
        red: vec![Bound {
            op: CompareOp::GreaterEqual,
            value: 10.0,
        }],
        yellow: vec![Bound::above(5.0)],
    };
    assert_eq!(rule.evaluate(12.0), Some(Severity::Red));
    assert_eq!(rule.evaluate(10.0), Some(Severity::Red));
    assert_eq!(rule.evaluate(6.0), Some(Severity::Yellow));
    assert_eq!(rule.evaluate(5.0), None);
    assert_eq!("lte".parse::<CompareOp>().unwrap(), CompareOp::LessEqual);
}

// ---- classifier ----

#[test]
fn critical_glucose_is_red() {
    let table = ThresholdTable::standard();
    let record = make_record("1", "P1", &[("glucose", num(320.0))], 0);
    let c = classify(&record, &table);
    assert_eq!(c.severity, Severity::Red);
    assert!(c.reasons.contains(&"CRITICAL: glucose is 320".to_string()));
    assert!(c.has_abnormal_value);
    assert_eq!(c.status, AlertStatus::Pending);
}

#[test]
fn any_glucose_above_300_is_red_with_glucose_reason() {
    let table = ThresholdTable::standard();
    for value in [300.5, 301.0, 350.0, 999.0] {
        let record = make_record("1", "P1", &[("Glucose", num(value))], 0);
        let c = classify(&record, &table);
        assert_eq!(c.severity, Severity::Red, "glucose={value}");
        assert!(c.reasons.iter().any(|r| r.to_lowercase().contains("glucose")));
    }
}

#[test]
fn two_yellow_readings_are_yellow() {
    let table = ThresholdTable::standard();
    let record = make_record(
        "1",
        "P1",
        &[("heartRate", num(45.0)), ("bloodPressure", num(95.0))],
        0,
    );
    let c = classify(&record, &table);
    assert_eq!(c.severity, Severity::Yellow);
    assert_eq!(c.reasons.len(), 1);
    assert_eq!(c.reasons[0], "WARNING: heartRate is 45");
}

#[test]
fn normal_reading_without_upstream_reasons_is_green() {
    let table = ThresholdTable::standard();
    let record = make_record("1", "P1", &[("glucose", num(110.0))], 0);
    let c = classify(&record, &table);
    assert_eq!(c.severity, Severity::Green);
    assert_eq!(c.reasons, vec![NORMAL_REASON.to_string()]);
    assert!(!c.has_abnormal_value);
    assert_eq!(c.status, AlertStatus::Healthy);
}

#[test]
fn red_is_never_downgraded_by_later_yellow() {
    let table = ThresholdTable::standard();
    let red_first = make_record(
        "1",
        "P1",
        &[
            ("temperature", num(104.0)),
            ("heartRate", num(110.0)),
            ("glucose", num(190.0)),
        ],
        0,
    );
    let red_last = make_record(
        "2",
        "P2",
        &[
            ("heartRate", num(110.0)),
            ("glucose", num(190.0)),
            ("temperature", num(104.0)),
        ],
        0,
    );
    for record in [red_first, red_last] {
        let c = classify(&record, &table);
        assert_eq!(c.severity, Severity::Red);
        assert_eq!(c.reasons.len(), 3, "yellow matches are still recorded");
    }
}

#[test]
fn text_readings_never_trigger() {
    let table = ThresholdTable::standard();
    let record = make_record(
        "1",
        "P1",
        &[
            ("glucose", Reading::Text("high".into())),
            ("bloodPressure", Reading::Text("185/95".into())),
        ],
        0,
    );
    let c = classify(&record, &table);
    // "185/95" reads as its systolic half; "high" is ignored.
    assert_eq!(c.severity, Severity::Red);
    assert_eq!(c.reasons, vec!["CRITICAL: bloodPressure is 185".to_string()]);
}

#[test]
fn identity_fields_are_not_readings() {
    let table = ThresholdTable::standard();
    let record = make_record(
        "1",
        "P1",
        &[("age", num(400.0)), ("patientId", num(999.0)), ("pulse", num(80.0))],
        0,
    );
    let c = classify(&record, &table);
    assert_eq!(c.severity, Severity::Green);
}

#[test]
fn upstream_reasons_are_a_fallback() {
    let table = ThresholdTable::standard();

    let mut severe = make_record("1", "P1", &[("glucose", num(110.0))], 0);
    severe.payload.alert_reasons = vec!["Severe dizziness reported".into()];
    let c = classify(&severe, &table);
    assert_eq!(c.severity, Severity::Red);
    assert_eq!(c.reasons, vec!["Severe dizziness reported".to_string()]);

    let mut mild = make_record("2", "P2", &[], 0);
    mild.payload.alert_reasons = vec!["Missed appointment".into()];
    let c = classify(&mild, &table);
    assert_eq!(c.severity, Severity::Yellow);

    // Threshold reasons take precedence over upstream ones.
    let mut both = make_record("3", "P3", &[("heartRate", num(105.0))], 0);
    both.payload.alert_reasons = vec!["EMERGENCY".into()];
    let c = classify(&both, &table);
    assert_eq!(c.severity, Severity::Yellow);
    assert_eq!(c.reasons, vec!["WARNING: heartRate is 105".to_string()]);
}

#[test]
fn healthy_status_always_forces_green() {
    let table = ThresholdTable::standard();
    let mut record = make_record(
        "1",
        "P1",
        &[("glucose", num(500.0)), ("spo2", num(70.0))],
        0,
    );
    record.health_status = Some(HealthStatus::Healthy);
    record.is_alert = true;
    record.payload.alert_reasons = vec!["critical".into()];
    let c = classify(&record, &table);
    assert_eq!(c.severity, Severity::Green);
    assert_eq!(c.status, AlertStatus::Healthy);
    assert_eq!(c.reasons, vec![HEALTHY_OVERRIDE_REASON.to_string()]);
}

#[test]
fn is_alert_flag_lifts_green_to_yellow_only() {
    let table = ThresholdTable::standard();
    let mut flagged = make_record("1", "P1", &[("glucose", num(100.0))], 0);
    flagged.is_alert = true;
    let c = classify(&flagged, &table);
    assert_eq!(c.severity, Severity::Yellow);
    assert_eq!(c.reasons, vec![FLAGGED_REASON.to_string()]);

    let mut red = make_record("2", "P2", &[("glucose", num(400.0))], 0);
    red.is_alert = true;
    assert_eq!(classify(&red, &table).severity, Severity::Red);
}

// ---- aggregation & engine ----

#[test]
fn newest_row_per_patient_wins() {
    let table = ThresholdTable::standard();
    let older_green = make_record("10", "P1", &[("glucose", num(110.0))], 60);
    let newer_red = make_record("11", "P1", &[("glucose", num(350.0))], 10);

    // Storage order must not matter.
    for rows in [
        vec![older_green.clone(), newer_red.clone()],
        vec![newer_red.clone(), older_green.clone()],
    ] {
        let alerts = aggregate(rows, &table);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Red);
        assert_eq!(alerts[0].alert_id, "alert-11");
    }
}

#[test]
fn sequence_breaks_created_at_ties() {
    let table = ThresholdTable::standard();
    let mut first = make_record("20", "P1", &[("glucose", num(400.0))], 0);
    let mut second = first.clone();
    second.id = "21".into();
    second.payload.variables[0].value = num(100.0);
    first.sequence = 1;
    second.sequence = 2;
    second.created_at = first.created_at;

    let alerts = aggregate(vec![second, first], &table);
    assert_eq!(alerts[0].alert_id, "alert-21");
    assert_eq!(alerts[0].severity, Severity::Green);
}

#[test]
fn exactly_one_alert_per_patient() {
    let engine = TriageEngine::default();
    let mut rows = Vec::new();
    for i in 0..30 {
        let patient = format!("P{}", i % 7);
        let glucose = 60.0 + (i as f64) * 13.0;
        rows.push(make_record(&i.to_string(), &patient, &[("glucose", num(glucose))], 100 - i));
    }
    let alerts = engine.build_alert_set(rows);
    assert_eq!(alerts.len(), 7);
    let mut ids: Vec<&str> = alerts.iter().map(|a| a.patient_id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 7);
}

#[test]
fn alert_set_is_sorted_by_severity_and_stable() {
    let engine = TriageEngine::default();
    let rows = vec![
        make_record("1", "G1", &[("glucose", num(100.0))], 50),
        make_record("2", "Y1", &[("glucose", num(200.0))], 40),
        make_record("3", "R1", &[("glucose", num(400.0))], 30),
        make_record("4", "G2", &[("glucose", num(90.0))], 20),
        make_record("5", "Y2", &[("heartRate", num(105.0))], 15),
        make_record("6", "R2", &[("spo2", num(80.0))], 10),
    ];
    let alerts = engine.build_alert_set(rows);

    for pair in alerts.windows(2) {
        assert!(pair[0].severity.rank() <= pair[1].severity.rank());
    }
    let order: Vec<&str> = alerts.iter().map(|a| a.patient_id.as_str()).collect();
    assert_eq!(order, vec!["R1", "R2", "Y1", "Y2", "G1", "G2"]);

    for alert in &alerts {
        assert_eq!(alert.alert_count, alert.alert_reasons.len());
        assert!(!alert.message.is_empty());
    }
}

#[test]
fn empty_batch_yields_empty_set() {
    let engine = TriageEngine::default();
    assert!(engine.build_alert_set(Vec::new()).is_empty());
}

// ---- formatter ----

#[test]
fn red_message_shows_triggering_readings_and_suffix() {
    let engine = TriageEngine::default();
    let rows = vec![make_record(
        "1",
        "P1",
        &[
            ("weight", num(80.0)),
            ("glucose", num(320.0)),
            ("heartRate", num(105.0)),
        ],
        0,
    )];
    let alert = &engine.build_alert_set(rows)[0];
    let message = &alert.message;

    assert!(message.starts_with(RED_PREFIX));
    assert!(message.contains("Patient: Patient P1 (70y)"));
    assert!(message.contains("glucose: 320"));
    assert!(message.contains("heartRate: 105"));
    assert!(!message.contains("weight"));
    assert!(message.contains("CRITICAL: glucose is 320"));
    assert!(!message.contains("WARNING"));
    assert!(message.ends_with(RED_SUFFIX));
}

#[test]
fn yellow_message_is_capped() {
    let engine = TriageEngine::default();
    let rows = vec![make_record(
        "1",
        "P1",
        &[
            ("heartRate", num(105.0)),
            ("glucose", num(190.0)),
            ("temperature", num(100.2)),
            ("bloodPressure", num(150.0)),
        ],
        0,
    )];
    let alert = &engine.build_alert_set(rows)[0];
    assert_eq!(alert.severity, Severity::Yellow);
    assert_eq!(alert.alert_count, 4);

    let message = &alert.message;
    assert!(message.starts_with(YELLOW_PREFIX));
    assert!(message.contains("temperature: 100.2"));
    assert!(!message.contains("bloodPressure: 150"));
    assert!(message.contains("WARNING: heartRate is 105; WARNING: glucose is 190"));
    assert!(!message.contains("WARNING: temperature"));
    assert!(!message.contains(RED_SUFFIX));
}

#[test]
fn green_message_is_minimal() {
    let engine = TriageEngine::default();
    let rows = vec![make_record(
        "1",
        "P1",
        &[("glucose", num(110.0)), ("heartRate", num(70.0))],
        0,
    )];
    let alert = &engine.build_alert_set(rows)[0];
    let message = &alert.message;
    assert!(message.contains("glucose: 110"));
    assert!(!message.contains("heartRate"));
    assert!(message.contains(GREEN_REASSURANCE));
    assert!(!message.contains(NORMAL_REASON));
    assert!(message.len() < 200);
}

#[test]
fn formatting_is_idempotent() {
    let engine = TriageEngine::default();
    let rows = vec![make_record(
        "1",
        "P1",
        &[("glucose", num(320.0)), ("spo2", num(88.0))],
        0,
    )];
    let alert = &engine.build_alert_set(rows)[0];
    assert_eq!(format_message(alert), format_message(alert));
    assert_eq!(format_message(alert), alert.message);
}
