//! Application layer for the Automation Rule context.

pub mod ports;
pub mod query_handlers;
pub mod rule_engine;
