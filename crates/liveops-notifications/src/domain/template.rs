//! `{{variable}}` message templates.

use std::collections::{BTreeMap, BTreeSet};

use liveops_core::ports::RenderedMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Title and body with `{{name}}` placeholders. Whitespace inside the braces
/// is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Title template.
    pub title: String,
    /// Body template.
    pub body: String,
}

/// A placeholder without a value, or an unclosed `{{`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// No value for the named variable.
    #[error("no value for template variable `{0}`")]
    Missing(String),
    /// `{{` without a closing `}}`.
    #[error("unclosed `{{{{` in template")]
    Unclosed,
}

fn substitute(
    text: &str,
    variables: &BTreeMap<String, String>,
    missing: &mut BTreeSet<String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or(TemplateError::Unclosed)?;
        let name = after[..end].trim();
        match variables.get(name) {
            Some(value) => out.push_str(value),
            None => {
                missing.insert(name.to_owned());
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

impl MessageTemplate {
    /// Creates a template.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Substitutes every placeholder.
    ///
    /// # Errors
    ///
    /// Returns the first missing variable in name order, or
    /// `TemplateError::Unclosed`.
    pub fn render(
        &self,
        variables: &BTreeMap<String, String>,
    ) -> Result<RenderedMessage, TemplateError> {
        let mut missing = BTreeSet::new();
        let title = substitute(&self.title, variables, &mut missing)?;
        let body = substitute(&self.body, variables, &mut missing)?;
        if let Some(name) = missing.into_iter().next() {
            return Err(TemplateError::Missing(name));
        }
        Ok(RenderedMessage { title, body })
    }
}
