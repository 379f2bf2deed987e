//! Live-ops engine — Content Deployment bounded context.
//!
//! Responsible for validating content versions, rolling them out in stages,
//! promoting them to production and rolling them back.

pub mod application;
pub mod domain;
