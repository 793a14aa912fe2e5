use serde::{Deserialize, Serialize};

/// A switch system as seen by the controller at the time it was listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Graph node identifier, stable within the blueprint.
    pub id: String,
    pub label: String,
    pub hostname: Option<String>,
    /// Hardware serial the controller uses to address commands. Absent until
    /// a physical device is assigned to the node.
    pub system_id: Option<String>,
    pub role: Option<String>,
    pub blueprint_id: String,
}

impl Device {
    /// Best human readable name: hostname, then label, then node id.
    pub fn display_name(&self) -> &str {
        self.hostname
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                if self.label.is_empty() {
                    &self.id
                } else {
                    &self.label
                }
            })
    }
}
