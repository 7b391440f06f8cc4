//! nvframes - batch GPU frame extraction
//!
//! This library crate exposes the scheduling layers for integration testing:
//! the process supervisor, the per-device orchestrator and the worker entry.

pub mod config;
pub mod job;
pub mod orchestrator;
pub mod supervisor;
pub mod worker;
