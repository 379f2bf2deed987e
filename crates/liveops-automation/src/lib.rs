//! Live-ops engine — Automation Rule bounded context.
//!
//! Evaluates condition sets against the metric store and entity state, and
//! dispatches declarative actions to the components that own them. The rule
//! engine holds no business logic of its own.

pub mod application;
pub mod domain;
