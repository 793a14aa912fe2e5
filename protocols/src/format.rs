//! # Key Line Format Table
//!
//! Describes, as data, how encrypted key material shows up in device output.
//!
//! An encrypted value always looks like `$<marker>$<payload>`. The table maps markers to
//! ciphers and holds a list of rules that find such a value on a line:
//!
//! * **tag** rules: the line itself starts with `<TAG>$<marker>$<payload>` (`AUTH$1$...`).
//! * **keyword** rules: the value follows a keyword token, optionally quoted and
//!   `;`-terminated (`authentication-key "$9$...";`).
//!
//! Vendor formats drift between releases, so the table can be loaded from JSON and
//! validated against real samples instead of being hard-coded.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use snmpkey_common::models::key::KeyType;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cipher {
    /// Junos `$9$` obfuscation.
    Junos9,
    /// Standard alphabet base64 with padding.
    Base64,
}

impl Cipher {
    pub fn name(&self) -> &'static str {
        match self {
            Cipher::Junos9 => "junos9",
            Cipher::Base64 => "base64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "lowercase")]
pub enum Locator {
    Tag { tag: String },
    Keyword { keyword: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRule {
    pub name: String,
    pub key_type: KeyType,
    #[serde(flatten)]
    pub locator: Locator,
}

impl FormatRule {
    fn tag(name: &str, tag: &str, key_type: KeyType) -> Self {
        Self {
            name: name.to_string(),
            key_type,
            locator: Locator::Tag {
                tag: tag.to_string(),
            },
        }
    }

    fn keyword(name: &str, keyword: &str, key_type: KeyType) -> Self {
        Self {
            name: name.to_string(),
            key_type,
            locator: Locator::Keyword {
                keyword: keyword.to_string(),
            },
        }
    }

    /// Returns the `$<marker>$<payload>` part of `line` if this rule applies to it.
    pub fn locate<'a>(&self, line: &'a str) -> Option<&'a str> {
        match &self.locator {
            Locator::Tag { tag } => line
                .trim()
                .strip_prefix(tag.as_str())
                .filter(|rest| rest.starts_with('$')),
            Locator::Keyword { keyword } => {
                let mut tokens = line.split_whitespace();
                tokens.find(|token| token == keyword)?;
                let value = tokens.next()?;
                let value = value.strip_suffix(';').unwrap_or(value);
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                value.starts_with('$').then_some(value)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum FormatTableError {
    #[error("invalid format table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("format table has no rules")]
    NoRules,

    #[error("rule `{0}` has an empty tag or keyword")]
    EmptyLocator(String),

    #[error("cipher marker `{0}` must be non-empty and must not contain `$`")]
    BadMarker(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatTable {
    pub ciphers: BTreeMap<String, Cipher>,
    pub rules: Vec<FormatRule>,
}

impl Default for FormatTable {
    fn default() -> Self {
        Self {
            ciphers: BTreeMap::from([
                ("1".to_string(), Cipher::Base64),
                ("9".to_string(), Cipher::Junos9),
            ]),
            rules: vec![
                FormatRule::tag("tagged-auth", "AUTH", KeyType::Auth),
                FormatRule::tag("tagged-priv", "PRIV", KeyType::Priv),
                FormatRule::keyword("junos-auth", "authentication-key", KeyType::Auth),
                FormatRule::keyword("junos-priv", "privacy-key", KeyType::Priv),
            ],
        }
    }
}

impl FormatTable {
    pub fn from_json(json: &str) -> Result<Self, FormatTableError> {
        let table: FormatTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading format table {}", path.display()))?;
        let table = Self::from_json(&json)
            .with_context(|| format!("loading format table {}", path.display()))?;
        debug!(
            rules = table.rules.len(),
            ciphers = table.ciphers.len(),
            "format table loaded from {}",
            path.display()
        );
        Ok(table)
    }

    pub fn cipher(&self, marker: &str) -> Option<Cipher> {
        self.ciphers.get(marker).copied()
    }

    fn validate(&self) -> Result<(), FormatTableError> {
        if self.rules.is_empty() {
            return Err(FormatTableError::NoRules);
        }
        for rule in &self.rules {
            let locator = match &rule.locator {
                Locator::Tag { tag } => tag,
                Locator::Keyword { keyword } => keyword,
            };
            if locator.trim().is_empty() {
                return Err(FormatTableError::EmptyLocator(rule.name.clone()));
            }
        }
        if let Some(marker) = self
            .ciphers
            .keys()
            .find(|marker| marker.is_empty() || marker.contains('$'))
        {
            return Err(FormatTableError::BadMarker(marker.clone()));
        }
        Ok(())
    }
}
