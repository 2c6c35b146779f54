//! Online presence grader
//!
//! Scans a local business across search visibility, website experience and
//! local listings, benchmarks it against nearby competitors, and writes a
//! scored report. Scans fan out into queued jobs processed by a worker pool
//! over Redis, with results persisted in PostgreSQL.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
