pub mod config;
pub mod search;
pub mod service;
pub mod telemetry;
