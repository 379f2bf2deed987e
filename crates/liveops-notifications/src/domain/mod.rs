//! Domain layer for the Notification Campaign context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod template;
