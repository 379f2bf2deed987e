//! Live-ops engine — Event Lifecycle bounded context.
//!
//! Responsible for advancing scheduled promotional events through
//! activation, per-player objective progress, completion and reward
//! settlement.

pub mod application;
pub mod domain;
