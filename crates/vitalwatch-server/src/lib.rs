//! HTTP service and operator tooling for vitalwatch.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod logging;
pub mod seed;
pub mod state;
