//! Comparison operators shared by alert thresholds and rule conditions.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Tolerance used by `Equals`/`NotEquals` on numbers.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// A value read from the metric store or from an entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A numeric value.
    Number(f64),
    /// A textual value, e.g. an entity status.
    Text(String),
}

impl FieldValue {
    /// Returns the numeric value, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Comparison between an observed value (left) and a threshold (right).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `observed > threshold`.
    GreaterThan,
    /// `observed >= threshold`.
    GreaterOrEqual,
    /// `observed < threshold`.
    LessThan,
    /// `observed <= threshold`.
    LessOrEqual,
    /// `|observed - threshold| <= tolerance`.
    ApproxEqual {
        /// Absolute tolerance.
        tolerance: f64,
    },
    /// Equality: numbers within [`DEFAULT_TOLERANCE`], text exactly.
    Equals,
    /// Negation of `Equals`.
    NotEquals,
}

impl Comparison {
    /// Rejects operators whose parameters are unusable.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if an `ApproxEqual` tolerance
    /// is negative or not finite.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Self::ApproxEqual { tolerance } = self
            && (!tolerance.is_finite() || *tolerance < 0.0)
        {
            return Err(DomainError::InvariantViolation(format!(
                "approx-equal tolerance must be a finite non-negative number, got {tolerance}"
            )));
        }
        Ok(())
    }

    /// Whether the operator only makes sense for numbers.
    #[must_use]
    pub fn is_numeric_only(&self) -> bool {
        !matches!(self, Self::Equals | Self::NotEquals)
    }

    /// Compares two numbers.
    #[must_use]
    pub fn holds(&self, observed: f64, threshold: f64) -> bool {
        if observed.is_nan() || threshold.is_nan() {
            return false;
        }
        match self {
            Self::GreaterThan => observed > threshold,
            Self::GreaterOrEqual => observed >= threshold,
            Self::LessThan => observed < threshold,
            Self::LessOrEqual => observed <= threshold,
            Self::ApproxEqual { tolerance } => (observed - threshold).abs() <= *tolerance,
            Self::Equals => (observed - threshold).abs() <= DEFAULT_TOLERANCE,
            Self::NotEquals => (observed - threshold).abs() > DEFAULT_TOLERANCE,
        }
    }

    /// Compares two field values. Mismatched kinds never hold, and ordering
    /// operators never hold for text.
    #[must_use]
    pub fn holds_for(&self, observed: &FieldValue, threshold: &FieldValue) -> bool {
        match (observed, threshold) {
            (FieldValue::Number(o), FieldValue::Number(t)) => self.holds(*o, *t),
            (FieldValue::Text(o), FieldValue::Text(t)) => match self {
                Self::Equals => o == t,
                Self::NotEquals => o != t,
                _ => false,
            },
            _ => false,
        }
    }
}
