use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: String,
    pub label: String,
}

impl Blueprint {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// A selector matches either the identifier or, case-insensitively, the label.
    pub fn matches(&self, selector: &str) -> bool {
        self.id == selector || self.label.eq_ignore_ascii_case(selector)
    }
}

impl fmt::Display for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

/// Resolves a user supplied selector against the blueprints the controller knows.
///
/// Identifiers take precedence over labels.
pub fn find<'a>(blueprints: &'a [Blueprint], selector: &str) -> Option<&'a Blueprint> {
    blueprints
        .iter()
        .find(|bp| bp.id == selector)
        .or_else(|| blueprints.iter().find(|bp| bp.matches(selector)))
}
