//! Operator-side loading: runtime settings and telemetry batches from files.

use crate::config::ConfigsSeedFile;
use anyhow::{Context, Result};
use serde::Deserialize;
use vitalwatch_common::ingest::{validate_all, IngestRecord};
use vitalwatch_common::types::BatchContext;
use vitalwatch_notify::plugin::ChannelRegistry;
use vitalwatch_storage::{TriageStore, CHANNEL_CREDENTIALS_KEY, DESTINATION_ADDRESS_KEY};

/// Writes the settings present in `seed`. Returns how many were written.
///
/// Channel credentials are validated against `registry` first so a typo is
/// caught here rather than at the first send.
pub async fn apply_configs_seed(
    store: &dyn TriageStore,
    registry: &ChannelRegistry,
    seed: &ConfigsSeedFile,
) -> Result<usize> {
    let mut written = 0;

    if let Some(address) = &seed.alert_destination_address {
        let address = address.trim();
        if address.is_empty() {
            anyhow::bail!("alert_destination_address is empty");
        }
        store.set_setting(DESTINATION_ADDRESS_KEY, address).await?;
        tracing::info!("Destination address updated");
        written += 1;
    }

    if let Some(creds) = &seed.channel_credentials {
        let plugin = registry.get_plugin(&creds.channel_type).ok_or_else(|| {
            anyhow::anyhow!(
                "unknown channel type '{}' (available: {})",
                creds.channel_type,
                registry.plugin_names().join(", ")
            )
        })?;
        plugin.validate_config(&creds.config)?;
        store
            .set_setting(CHANNEL_CREDENTIALS_KEY, &serde_json::to_string(creds)?)
            .await?;
        tracing::info!(
            channel = %creds.channel_type,
            config = %plugin.redact_config(&creds.config),
            "Channel credentials updated"
        );
        written += 1;
    }

    Ok(written)
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub batch: BatchContext,
    pub stored: usize,
    pub skipped: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    List(Vec<IngestRecord>),
    Wrapped { records: Vec<IngestRecord> },
}

/// Parses a records file: either a JSON array or `{"records": [...]}`.
pub fn parse_records(content: &str) -> Result<Vec<IngestRecord>> {
    let file: RecordsFile =
        serde_json::from_str(content).context("records file is not a JSON list of records")?;
    Ok(match file {
        RecordsFile::List(rows) => rows,
        RecordsFile::Wrapped { records } => records,
    })
}

/// Validates `rows` and stores the valid ones as a new batch.
pub async fn import_batch(
    store: &dyn TriageStore,
    name: &str,
    rows: Vec<IngestRecord>,
) -> Result<ImportSummary> {
    let total = rows.len();
    let records = validate_all(rows);
    let batch = store.create_batch(name).await?;
    let stored = store.insert_records(&batch.id, &records).await?;
    let skipped = total - records.len();
    tracing::info!(batch_id = %batch.id, stored, skipped, "Imported telemetry batch");
    Ok(ImportSummary {
        batch,
        stored,
        skipped,
    })
}
