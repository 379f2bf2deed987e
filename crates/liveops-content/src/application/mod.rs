//! Application layer for the Content Deployment context.

pub mod deployment_pipeline;
pub mod query_handlers;
