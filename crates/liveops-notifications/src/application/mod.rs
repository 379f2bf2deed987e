//! Application layer for the Notification Campaign context.

pub mod campaign_scheduler;
pub mod query_handlers;
