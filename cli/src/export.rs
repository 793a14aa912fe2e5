use std::fs;
use std::path::Path;

use anyhow::Context;
use serde_json::{Map, Value, json};
use snmpkey_common::models::report::BulkReport;
use snmpkey_core::retrieval::BlueprintRun;

pub fn write_report(path: &Path, report: &BulkReport) -> anyhow::Result<()> {
    write_json(path, &report.to_json())
}

/// `{ "<label>": { "id", "devices" } }`, or `{ "id", "error" }` for blueprints whose
/// systems could not be listed.
pub fn blueprint_runs_to_json(runs: &[BlueprintRun]) -> Value {
    let mut map = Map::new();
    for run in runs {
        let entry = match &run.outcome {
            Ok(report) => json!({ "id": run.blueprint.id, "devices": report.to_json() }),
            Err(err) => json!({ "id": run.blueprint.id, "error": err.to_string() }),
        };
        map.insert(run.blueprint.label.clone(), entry);
    }
    Value::Object(map)
}

/// Writes `value` as pretty printed JSON, creating parent directories as needed.
pub fn write_json(path: &Path, value: &Value) -> anyhow::Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))
}
