//! Request and response payloads of the controller REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snmpkey_common::models::blueprint::Blueprint;
use snmpkey_common::models::device::Device;

pub const SWITCH_QUERY: &str = "node(type='system', name='switch_nodes', system_type='switch')";

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
pub struct LoginResponse {
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct Items<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Deserialize)]
pub struct BlueprintItem {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

impl From<BlueprintItem> for Blueprint {
    fn from(item: BlueprintItem) -> Self {
        Blueprint::new(item.id, item.label)
    }
}

#[derive(Serialize)]
pub struct QueryRequest<'a> {
    pub query: &'a str,
}

#[derive(Deserialize)]
pub struct QueryRow {
    pub switch_nodes: Option<SystemNode>,
}

#[derive(Deserialize)]
pub struct SystemNode {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub system_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl SystemNode {
    pub fn into_device(self, blueprint_id: &str) -> Device {
        Device {
            label: self.label.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            hostname: self.hostname,
            system_id: self.system_id.filter(|sid| !sid.is_empty()),
            role: self.role,
            blueprint_id: blueprint_id.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct FetchCommandRequest<'a> {
    pub system_id: &'a str,
    pub output_format: &'a str,
    pub command_text: &'a str,
}

#[derive(Deserialize)]
pub struct FetchCommandAccepted {
    pub request_id: Option<String>,
}

#[derive(Deserialize)]
pub struct FetchCommandStatus {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

pub enum JobState {
    Running,
    Done(String),
    Failed(String),
}

impl FetchCommandStatus {
    pub fn state(self) -> JobState {
        let output = match self.output {
            Some(Value::String(text)) => text,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        match self.result.as_deref() {
            Some("success") => JobState::Done(output),
            Some("failure") | Some("error") | Some("timeout") => {
                let reason = self.error.filter(|e| !e.is_empty()).unwrap_or(output);
                JobState::Failed(reason)
            }
            _ => JobState::Running,
        }
    }
}

#[derive(Serialize)]
pub struct PropertySetBody<'a> {
    pub label: &'a str,
    pub values: &'a Map<String, Value>,
}

#[derive(Deserialize)]
pub struct Created {
    pub id: Option<String>,
}
