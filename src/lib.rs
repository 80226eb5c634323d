//! Keel - service scaffold
//!
//! Shared infrastructure for REST microservices: configuration from the
//! environment, database connection and schema sync, a hardened HTTP
//! middleware stack, health checks and a generator for new services.

#![allow(missing_docs)]

pub mod api;
pub mod app;
pub mod app_info;
pub mod boot;
pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod environment;
pub mod example;
pub mod generator;
pub mod log_shipper;
pub mod module;
pub mod rate_limiting;
pub mod router;
pub mod security;
pub mod setup_tracing;
