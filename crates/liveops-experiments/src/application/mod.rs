//! Application layer for the A/B Testing context.

pub mod query_handlers;
pub mod test_engine;
