use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub label: String,
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl PropertySet {
    pub fn new(label: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            id: None,
            label: label.into(),
            values,
            created_at: None,
            updated_at: None,
        }
    }

    /// Serialized size of the values, in bytes.
    pub fn values_size(&self) -> usize {
        Value::Object(self.values.clone()).to_string().len()
    }
}

/// Identifiers take precedence over labels, labels match exactly.
pub fn find<'a>(sets: &'a [PropertySet], selector: &str) -> Option<&'a PropertySet> {
    sets.iter()
        .find(|set| set.id.as_deref() == Some(selector))
        .or_else(|| sets.iter().find(|set| set.label == selector))
}
