//! Storage layer for Aegis Core.
//!
//! Durable trace sink via SQLx with SQLite.

mod trace_store;

pub use trace_store::TraceStore;
