//! Live-ops engine — Notification Campaign bounded context.
//!
//! Decides when targeted message campaigns are due and hands rendered
//! messages to the external delivery channel.

pub mod application;
pub mod domain;
