//! Domain layer for the Event Lifecycle context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod templates;
