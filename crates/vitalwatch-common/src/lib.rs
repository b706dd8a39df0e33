//! Shared domain types for the vitalwatch triage workspace.
//!
//! Telemetry arrives as loosely typed JSON ([`ingest::IngestRecord`]) and is
//! validated once into [`types::NewTelemetryRecord`]. Everything downstream
//! of ingestion works on the typed records only.

pub mod cache;
pub mod error;
pub mod id;
pub mod ingest;
pub mod types;
