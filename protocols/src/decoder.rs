use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use snmpkey_common::models::key::DecodedKey;
use thiserror::Error;

use crate::format::{Cipher, FormatRule, FormatTable};
use crate::junos9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("line does not match any known key format")]
    Unrecognized,

    #[error("{rule}: unknown cipher marker `{marker}`")]
    UnknownMarker { rule: String, marker: String },

    #[error("{rule}: malformed {cipher} ciphertext: {reason}")]
    Malformed {
        rule: String,
        cipher: &'static str,
        reason: String,
    },

    #[error("{rule}: decoded key is empty or not printable")]
    Empty { rule: String },
}

/// Stateless parser turning single lines of device output into keys.
#[derive(Debug, Clone, Default)]
pub struct KeyDecoder {
    table: FormatTable,
}

impl KeyDecoder {
    pub fn new(table: FormatTable) -> Self {
        Self { table }
    }

    /// Decodes one raw line. The first rule that locates a value decides the outcome.
    pub fn decode(&self, raw_line: &str) -> Result<DecodedKey, DecodeError> {
        let (rule, encoded) = self
            .table
            .rules
            .iter()
            .find_map(|rule| rule.locate(raw_line).map(|value| (rule, value)))
            .ok_or(DecodeError::Unrecognized)?;

        let value = self.decode_value(rule, encoded)?;
        Ok(DecodedKey::new(rule.key_type, value))
    }

    fn decode_value(&self, rule: &FormatRule, encoded: &str) -> Result<String, DecodeError> {
        let (marker, payload) = encoded
            .strip_prefix('$')
            .and_then(|rest| rest.split_once('$'))
            .ok_or_else(|| DecodeError::UnknownMarker {
                rule: rule.name.clone(),
                marker: String::new(),
            })?;

        let cipher = self
            .table
            .cipher(marker)
            .ok_or_else(|| DecodeError::UnknownMarker {
                rule: rule.name.clone(),
                marker: marker.to_string(),
            })?;

        let malformed = |reason: String| DecodeError::Malformed {
            rule: rule.name.clone(),
            cipher: cipher.name(),
            reason,
        };

        let value = match cipher {
            Cipher::Junos9 => junos9::decrypt_body(payload).map_err(|e| malformed(e.to_string()))?,
            Cipher::Base64 => {
                let bytes = STANDARD
                    .decode(payload)
                    .map_err(|e| malformed(e.to_string()))?;
                String::from_utf8(bytes).map_err(|e| malformed(e.to_string()))?
            }
        };

        if value.trim().is_empty() || value.chars().any(char::is_control) {
            return Err(DecodeError::Empty {
                rule: rule.name.clone(),
            });
        }
        Ok(value)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
