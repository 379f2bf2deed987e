//! Application layer for the Alert context.

pub mod alert_evaluator;
