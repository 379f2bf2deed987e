//! Live-ops engine — the orchestration facade over every bounded context.
//!
//! The host constructs a [`facade::LiveOpsEngine`] with its collaborators,
//! drives it with a [`runner::ReconciliationRunner`] and drains lifecycle
//! events through [`facade::LiveOpsEngine::subscribe`].

pub mod adapters;
pub mod config;
pub mod error;
pub mod facade;
pub mod runner;
pub mod telemetry;

mod wiring;
