//! Application layer for the Event Lifecycle context.

pub mod lifecycle_manager;
pub mod query_handlers;
