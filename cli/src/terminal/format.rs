use colored::*;
use snmpkey_common::models::device::Device;
use snmpkey_common::models::property_set::PropertySet;
use snmpkey_common::models::report::{ExtractionResult, ExtractionStatus};

use crate::terminal::colors;

pub type Detail = (String, ColoredString);

const MISSING: &str = "-";

fn optional(value: Option<&str>) -> ColoredString {
    match value {
        Some(value) if !value.is_empty() => value.color(colors::TEXT_DEFAULT),
        _ => MISSING.color(colors::SEPARATOR),
    }
}

pub fn status_to_colored(status: ExtractionStatus) -> ColoredString {
    match status {
        ExtractionStatus::Succeeded => status.to_string().color(colors::SUCCEEDED).bold(),
        ExtractionStatus::Failed => status.to_string().color(colors::FAILED).bold(),
    }
}

pub fn device_to_details(device: &Device) -> Vec<Detail> {
    vec![
        ("Node".to_string(), device.id.as_str().color(colors::TEXT_DEFAULT)),
        ("Hostname".to_string(), optional(device.hostname.as_deref())),
        ("System".to_string(), optional(device.system_id.as_deref())),
        ("Role".to_string(), optional(device.role.as_deref())),
    ]
}

pub fn result_to_details(res: &ExtractionResult) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![
        ("Node".to_string(), res.device_id.as_str().color(colors::TEXT_DEFAULT)),
        ("System".to_string(), optional(res.system_id.as_deref())),
        ("Status".to_string(), status_to_colored(res.status)),
    ];

    if res.is_success() {
        details.push(("Auth".to_string(), key_to_colored(res.auth_key.as_deref())));
        details.push(("Priv".to_string(), key_to_colored(res.priv_key.as_deref())));
    }

    if let Some(failure) = &res.failure {
        details.push(("Error".to_string(), failure.to_string().color(colors::FAILED)));
    }

    if !res.warnings.is_empty() {
        let count = format!("{} undecodable line(s)", res.warnings.len());
        details.push(("Warnings".to_string(), count.color(colors::WARNING)));
    }

    details
}

pub fn property_set_to_details(set: &PropertySet) -> Vec<Detail> {
    vec![
        ("Id".to_string(), optional(set.id.as_deref())),
        ("Created".to_string(), optional(set.created_at.as_deref())),
        ("Updated".to_string(), optional(set.updated_at.as_deref())),
        ("Size".to_string(), format!("{} bytes", set.values_size()).color(colors::TEXT_DEFAULT)),
    ]
}

fn key_to_colored(key: Option<&str>) -> ColoredString {
    match key {
        Some(key) => key.color(colors::KEY_VALUE),
        None => "not configured".color(colors::SEPARATOR).italic(),
    }
}
