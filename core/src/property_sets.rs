//! Turns a [`BulkReport`] into property-set values and writes them back to the controller.
//!
//! A set that already exists is only touched when the [`WritePolicy`] says so. Merging keeps
//! the stored entries of devices that did not succeed this time.

use serde_json::{Map, Value, json};
use snmpkey_common::error::PropertySetError;
use snmpkey_common::models::property_set::PropertySet;
use snmpkey_common::models::report::BulkReport;
use tracing::{info, warn};

use crate::controller::ControllerApi;
use crate::session::Session;

/// Top level key every value set lives under.
pub const VALUES_KEY: &str = "snmp_auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Leave an existing set alone.
    #[default]
    SkipExisting,
    /// Replace the values of an existing set.
    Overwrite,
    /// Fold the new entries into the stored ones. New entries win.
    Merge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Written {
    Created(PropertySet),
    Updated(PropertySet),
    /// The set already existed and was left as it is.
    Skipped(PropertySet),
}

impl Written {
    pub fn set(&self) -> &PropertySet {
        match self {
            Written::Created(set) | Written::Updated(set) | Written::Skipped(set) => set,
        }
    }
}

/// Name of the set written for one blueprint when all blueprints are processed.
pub fn blueprint_set_name(blueprint_label: &str, base: &str) -> String {
    format!("{blueprint_label}-{base}")
}

/// `{"snmp_auth": {"<hostname>": {system_id, authentication_key, privacy_key}}}` built from
/// succeeded devices only. `None` when no device succeeded.
pub fn build_values(report: &BulkReport) -> Option<Map<String, Value>> {
    let mut devices = Map::new();
    for res in report.succeeded() {
        devices.insert(
            res.display_name().to_string(),
            json!({
                "system_id": res.system_id,
                "authentication_key": res.auth_key,
                "privacy_key": res.priv_key,
            }),
        );
    }

    if devices.is_empty() {
        return None;
    }
    let mut values = Map::new();
    values.insert(VALUES_KEY.to_string(), Value::Object(devices));
    Some(values)
}

/// Objects present on both sides are merged one level deep, anything else is replaced.
pub fn merge_values(stored: &Map<String, Value>, fresh: Map<String, Value>) -> Map<String, Value> {
    let mut merged = stored.clone();
    for (key, value) in fresh {
        if let (Some(Value::Object(old)), Value::Object(new)) = (merged.get_mut(&key), &value) {
            old.extend(new.clone());
            continue;
        }
        merged.insert(key, value);
    }
    merged
}

/// Writes `values` to the set labelled `name`, honouring `policy` when it already exists.
pub async fn write(
    controller: &dyn ControllerApi,
    session: &Session,
    name: &str,
    values: Map<String, Value>,
    policy: WritePolicy,
) -> Result<Written, PropertySetError> {
    let existing = controller
        .list_property_sets(session)
        .await?
        .into_iter()
        .find(|set| set.label == name);

    let Some(existing) = existing else {
        let set = controller.create_property_set(session, name, values).await?;
        return Ok(Written::Created(set));
    };

    if policy == WritePolicy::SkipExisting {
        warn!(property_set = name, "property set exists, left untouched");
        return Ok(Written::Skipped(existing));
    }

    let id = existing.id.as_deref().ok_or_else(|| {
        PropertySetError::Transport(format!("property set {name} is listed without an id"))
    })?;
    let values = match policy {
        WritePolicy::Merge => merge_values(&existing.values, values),
        _ => values,
    };
    let set = controller
        .update_property_set(session, id, name, values)
        .await?;
    Ok(Written::Updated(set))
}

/// Stores the keys of the succeeded devices of `report` in the set labelled `name`.
pub async fn persist(
    controller: &dyn ControllerApi,
    session: &Session,
    name: &str,
    report: &BulkReport,
    policy: WritePolicy,
) -> Result<Written, PropertySetError> {
    let values = build_values(report).ok_or(PropertySetError::Empty)?;
    let written = write(controller, session, name, values, policy).await?;
    info!(
        blueprint = report.blueprint_id(),
        property_set = name,
        id = written.set().id.as_deref().unwrap_or("-"),
        "property set {}",
        match written {
            Written::Created(_) => "created",
            Written::Updated(_) => "updated",
            Written::Skipped(_) => "skipped",
        }
    );
    Ok(written)
}
