//! Live-ops core — shared domain abstractions.
//!
//! This crate defines the traits and types every reconciliation component
//! depends on: the clock, the error taxonomy, lifecycle-event envelopes, the
//! metric store and the ports through which the engine reaches external
//! collaborators. It contains no component logic.

pub mod aggregate;
pub mod bucketing;
pub mod clock;
pub mod command;
pub mod comparison;
pub mod error;
pub mod event;
pub mod external;
pub mod metrics;
pub mod ports;
pub mod retry;
pub mod rng;
pub mod snapshot;
pub mod trigger;
