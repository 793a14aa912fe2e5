use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Auth,
    Priv,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Auth => f.write_str("auth"),
            KeyType::Priv => f.write_str("priv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedKey {
    pub key_type: KeyType,
    pub value: String,
}

impl DecodedKey {
    pub fn new(key_type: KeyType, value: impl Into<String>) -> Self {
        Self {
            key_type,
            value: value.into(),
        }
    }
}
