//! Domain layer for the Alert context.

pub mod aggregates;
pub mod commands;
pub mod events;
