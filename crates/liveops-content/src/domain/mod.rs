//! Domain layer for the Content Deployment context.

pub mod aggregates;
pub mod checksum;
pub mod commands;
pub mod events;
pub mod validation;
