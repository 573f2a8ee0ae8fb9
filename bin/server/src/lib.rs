//! leadflow server.
//!
//! Hosts the workflow execution engine behind a small JSON API, backed by
//! PostgreSQL, and runs the resume scheduler alongside it.

pub mod actions;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
