//! Firing semantics shared by alerts and automation rules.

use serde::{Deserialize, Serialize};

/// When a continuously true condition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fires on every evaluation the condition holds.
    #[default]
    Level,
    /// Fires only when the condition goes from false to true.
    Edge,
}

impl TriggerMode {
    /// Whether a condition that `holds` now, and `held_before` on the previous
    /// evaluation, fires.
    #[must_use]
    pub fn fires(self, held_before: bool, holds: bool) -> bool {
        match self {
            Self::Level => holds,
            Self::Edge => holds && !held_before,
        }
    }
}

/// Operator-facing alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention.
    #[default]
    Warning,
    /// Needs immediate action.
    Critical,
}

impl Severity {
    /// Lower-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_fires_while_condition_holds() {
        assert!(TriggerMode::Level.fires(true, true));
        assert!(TriggerMode::Level.fires(false, true));
        assert!(!TriggerMode::Level.fires(true, false));
    }

    #[test]
    fn test_edge_fires_only_on_rising_transition() {
        assert!(TriggerMode::Edge.fires(false, true));
        assert!(!TriggerMode::Edge.fires(true, true));
        assert!(!TriggerMode::Edge.fires(false, false));
    }
}
