//! Domain layer for the A/B Testing context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod statistics;
