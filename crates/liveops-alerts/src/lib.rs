//! Live-ops engine — Alert bounded context.
//!
//! Compares metrics to thresholds and reports the alerts that trigger on
//! each pass, alongside alerts raised by hand or by automation rules.

pub mod application;
pub mod domain;
