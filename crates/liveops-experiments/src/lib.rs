//! Live-ops engine — A/B Testing bounded context.
//!
//! Responsible for allocating subjects to variants, tracking per-variant
//! conversions and resolving a winner once a test's exit condition holds.

pub mod application;
pub mod domain;
