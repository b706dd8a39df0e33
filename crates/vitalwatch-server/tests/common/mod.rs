#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::util::ServiceExt;
use vitalwatch_common::types::{NewTelemetryRecord, Reading, TelemetryPayload, VariableReading};
use vitalwatch_notify::plugin::{ChannelPlugin, ChannelRegistry};
use vitalwatch_notify::{NotificationChannel, SendReceipt};
use vitalwatch_server::app;
use vitalwatch_server::auth::create_token;
use vitalwatch_server::config::ServerConfig;
use vitalwatch_server::state::AppState;
use vitalwatch_storage::engine::SqliteTriageStore;
use vitalwatch_storage::TriageStore;

pub const TEST_SECRET: &str = "test-secret";
pub const DESTINATION: &str = "+15550100";

/// Messages delivered through the `mock` channel, as `(message, to)`.
#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("outbox lock").clone()
    }
}

struct MockChannel {
    outbox: Arc<Outbox>,
    fail_on: Vec<String>,
}

#[async_trait]
impl NotificationChannel for MockChannel {
    async fn send(&self, message: &str, to: &str) -> Result<SendReceipt> {
        if self.fail_on.iter().any(|needle| message.contains(needle)) {
            anyhow::bail!("mock gateway rejected message");
        }
        let mut sent = self.outbox.sent.lock().expect("outbox lock");
        sent.push((message.to_string(), to.to_string()));
        Ok(SendReceipt {
            id: format!("mock-{}", sent.len()),
        })
    }

    fn channel_type(&self) -> &str {
        "mock"
    }
}

struct MockPlugin {
    outbox: Arc<Outbox>,
}

impl ChannelPlugin for MockPlugin {
    fn name(&self) -> &str {
        "mock"
    }

    fn validate_config(&self, _config: &Value) -> Result<()> {
        Ok(())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let fail_on = config["fail_on"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(MockChannel {
            outbox: self.outbox.clone(),
            fail_on,
        }))
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteTriageStore>,
    pub state: AppState,
    pub app: axum::Router,
    pub outbox: Arc<Outbox>,
}

pub fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = ServerConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    let store = Arc::new(SqliteTriageStore::new(&config.database_path())?);

    let outbox = Arc::new(Outbox::default());
    let mut registry = ChannelRegistry::default();
    registry.register(Box::new(MockPlugin {
        outbox: outbox.clone(),
    }));

    let state = AppState::build(config, store.clone(), registry, TEST_SECRET.to_string())?;
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        store,
        state,
        app,
        outbox,
    })
}

impl TestContext {
    pub fn token(&self) -> String {
        create_token(TEST_SECRET, "test-nurse", 3600).expect("token should encode")
    }

    /// Points dispatch at the mock channel. `fail_on` makes messages containing
    /// any of the given substrings fail at the channel.
    pub async fn configure_mock_channel(&self, fail_on: &[&str]) {
        self.store
            .set_setting("alert_destination_address", DESTINATION)
            .await
            .expect("destination should store");
        let creds = serde_json::json!({
            "channel_type": "mock",
            "config": {"fail_on": fail_on},
        });
        self.store
            .set_setting("channel_credentials", &creds.to_string())
            .await
            .expect("credentials should store");
    }

    /// Stores `records` as a new batch and returns its id.
    pub async fn ingest(&self, name: &str, records: &[NewTelemetryRecord]) -> String {
        let batch = self
            .store
            .create_batch(name)
            .await
            .expect("batch should create");
        self.store
            .insert_records(&batch.id, records)
            .await
            .expect("records should insert");
        batch.id
    }
}

pub fn patient(id: &str, name: &str, readings: &[(&str, f64)]) -> NewTelemetryRecord {
    NewTelemetryRecord {
        patient_id: id.to_string(),
        name: name.to_string(),
        age: 58,
        condition: "Type 2 diabetes".to_string(),
        is_alert: false,
        health_status: None,
        payload: TelemetryPayload {
            variables: readings
                .iter()
                .map(|(name, value)| VariableReading {
                    name: name.to_string(),
                    value: Reading::Numeric(*value),
                })
                .collect(),
            ..Default::default()
        },
        created_at: None,
    }
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");

    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = builder.body(Body::empty()).expect("request should build");

    send(app, req).await
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub fn assert_err_envelope(json: &Value, message: &str) {
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], message);
    assert!(json["trace_id"].is_string());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    assert_eq!(json["success"], true);
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}
