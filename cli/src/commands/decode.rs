use std::path::Path;

use colored::*;
use snmpkey_protocols::{FormatTable, KeyDecoder};
use tracing::info;

use crate::commands::Outcome;
use crate::terminal::{colors, print};

pub fn load_decoder(formats: Option<&Path>) -> anyhow::Result<KeyDecoder> {
    let Some(path) = formats else {
        return Ok(KeyDecoder::default());
    };
    let table = FormatTable::load(path)?;
    info!("loaded {} format rules from {}", table.rules.len(), path.display());
    Ok(KeyDecoder::new(table))
}

pub fn decode(formats: Option<&Path>, lines: &[String]) -> anyhow::Result<Outcome> {
    let decoder = load_decoder(formats)?;
    let mut failed = 0;

    for (idx, line) in lines.iter().enumerate() {
        print::tree_head(idx, line);
        let details = match decoder.decode(line) {
            Ok(key) => vec![
                ("Type".to_string(), key.key_type.to_string().color(colors::PRIMARY)),
                ("Value".to_string(), key.value.color(colors::KEY_VALUE)),
            ],
            Err(err) => {
                failed += 1;
                vec![("Error".to_string(), err.to_string().color(colors::FAILED))]
            }
        };
        print::as_tree_one_level(details);
    }

    Ok(if failed == 0 {
        Outcome::Complete
    } else {
        Outcome::Partial
    })
}
