use crate::config::ServerConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vitalwatch_alert::engine::TriageEngine;
use vitalwatch_alert::rules::threshold::ThresholdTable;
use vitalwatch_alert::service::TriageService;
use vitalwatch_notify::dispatcher::{AlertDispatcher, DispatchOptions};
use vitalwatch_notify::plugin::ChannelRegistry;
use vitalwatch_storage::TriageStore;

#[derive(Clone)]
pub struct AppState {
    pub service: TriageService,
    pub dispatcher: Arc<AlertDispatcher>,
    pub start_time: DateTime<Utc>,
    pub jwt_secret: Arc<String>,
    pub token_expire_secs: u64,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wires the triage service and dispatcher over `store`.
    pub fn build(
        config: ServerConfig,
        store: Arc<dyn TriageStore>,
        registry: ChannelRegistry,
        jwt_secret: String,
    ) -> Result<Self> {
        let table = load_threshold_table(&config)?;
        let service = TriageService::new(store, Arc::new(TriageEngine::new(table)));
        let dispatcher = AlertDispatcher::new(
            service.clone(),
            Arc::new(registry),
            DispatchOptions {
                silence_secs: config.dispatch.silence_secs,
                cache_capacity: config.dispatch.cache_capacity,
            },
        );
        Ok(Self {
            service,
            dispatcher: Arc::new(dispatcher),
            start_time: Utc::now(),
            jwt_secret: Arc::new(jwt_secret),
            token_expire_secs: config.auth.token_expire_secs,
            config: Arc::new(config),
        })
    }
}

fn load_threshold_table(config: &ServerConfig) -> Result<ThresholdTable> {
    match &config.threshold_table {
        None => Ok(ThresholdTable::standard()),
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read threshold table '{path}': {e}"))?;
            let table = ThresholdTable::from_json(&json)?;
            tracing::info!(path = %path, rules = table.rules().len(), "Loaded threshold table");
            Ok(table)
        }
    }
}
