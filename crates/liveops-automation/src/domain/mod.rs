//! Domain layer for the Automation Rule context.

pub mod aggregates;
pub mod commands;
pub mod events;
