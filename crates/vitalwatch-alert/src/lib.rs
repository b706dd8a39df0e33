//! Triage engine turning telemetry rows into per-patient alert records.
//!
//! Each row is classified against a declarative [`rules::threshold::ThresholdTable`],
//! rows are collapsed to one record per patient by [`aggregator`], and the
//! [`engine::TriageEngine`] sorts the result by severity and renders each
//! alert's message through [`formatter`]. [`service::TriageService`] ties
//! the engine to a [`vitalwatch_storage::TriageStore`].

pub mod aggregator;
pub mod classifier;
pub mod engine;
pub mod formatter;
pub mod rules;
pub mod service;

#[cfg(test)]
mod tests;
