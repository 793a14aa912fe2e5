use std::fmt;

use serde_json::{Map, Value, json};

use crate::error::DeviceCommandError;
use crate::models::device::Device;
use crate::models::key::{DecodedKey, KeyType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStatus::Succeeded => f.write_str("succeeded"),
            ExtractionStatus::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The command never produced output.
    Command(DeviceCommandError),
    /// Output arrived but not a single line decoded. Details are in the warnings.
    NoDecodableKeys,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Command(err) => write!(f, "{err}"),
            FailureReason::NoDecodableKeys => f.write_str("no decodable key lines in command output"),
        }
    }
}

/// Finalized outcome for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub device_id: String,
    pub hostname: Option<String>,
    pub system_id: Option<String>,
    pub status: ExtractionStatus,
    pub auth_key: Option<String>,
    pub priv_key: Option<String>,
    /// Every key that decoded, in output order. `auth_key`/`priv_key` are the first of each type.
    pub keys: Vec<DecodedKey>,
    pub raw_output: Option<String>,
    pub failure: Option<FailureReason>,
    /// Lines that could not be decoded, kept even when the device succeeded.
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    /// Device with at least one decoded key.
    pub fn succeeded(
        device: &Device,
        raw_output: String,
        keys: Vec<DecodedKey>,
        warnings: Vec<String>,
    ) -> Self {
        let first_of = |key_type: KeyType| {
            keys.iter()
                .find(|key| key.key_type == key_type)
                .map(|key| key.value.clone())
        };

        Self {
            device_id: device.id.clone(),
            hostname: device.hostname.clone(),
            system_id: device.system_id.clone(),
            status: ExtractionStatus::Succeeded,
            auth_key: first_of(KeyType::Auth),
            priv_key: first_of(KeyType::Priv),
            keys,
            raw_output: Some(raw_output),
            failure: None,
            warnings,
        }
    }

    /// Output was received but nothing in it decoded.
    pub fn undecodable(device: &Device, raw_output: String, warnings: Vec<String>) -> Self {
        Self {
            device_id: device.id.clone(),
            hostname: device.hostname.clone(),
            system_id: device.system_id.clone(),
            status: ExtractionStatus::Failed,
            auth_key: None,
            priv_key: None,
            keys: Vec::new(),
            raw_output: Some(raw_output),
            failure: Some(FailureReason::NoDecodableKeys),
            warnings,
        }
    }

    /// No output at all. Key fields are never populated.
    pub fn command_failed(device_id: &str, device: Option<&Device>, error: DeviceCommandError) -> Self {
        Self {
            device_id: device_id.to_string(),
            hostname: device.and_then(|d| d.hostname.clone()),
            system_id: device.and_then(|d| d.system_id.clone()),
            status: ExtractionStatus::Failed,
            auth_key: None,
            priv_key: None,
            keys: Vec::new(),
            raw_output: None,
            failure: Some(FailureReason::Command(error)),
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractionStatus::Succeeded
    }

    pub fn command_error(&self) -> Option<&DeviceCommandError> {
        match &self.failure {
            Some(FailureReason::Command(err)) => Some(err),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.hostname
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.device_id)
    }
}

/// Outcomes of one bulk run, one per requested device, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    blueprint_id: String,
    results: Vec<ExtractionResult>,
}

impl BulkReport {
    pub fn new(blueprint_id: impl Into<String>, results: Vec<ExtractionResult>) -> Self {
        Self {
            blueprint_id: blueprint_id.into(),
            results,
        }
    }

    pub fn blueprint_id(&self) -> &str {
        &self.blueprint_id
    }

    pub fn results(&self) -> &[ExtractionResult] {
        &self.results
    }

    pub fn get(&self, device_id: &str) -> Option<&ExtractionResult> {
        self.results.iter().find(|res| res.device_id == device_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter().filter(|res| res.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter().filter(|res| !res.is_success())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// True when no device failed. A run over zero devices counts as successful.
    pub fn is_fully_successful(&self) -> bool {
        self.failed_count() == 0
    }

    /// `{ "<device id>": { authKey, privKey, status, error } }`, in report order.
    pub fn to_json(&self) -> Value {
        let mut map: Map<String, Value> = Map::new();
        for res in &self.results {
            let entry = json!({
                "authKey": res.auth_key,
                "privKey": res.priv_key,
                "status": res.status.to_string(),
                "error": res.failure.as_ref().map(ToString::to_string),
            });
            map.insert(res.device_id.clone(), entry);
        }
        Value::Object(map)
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
