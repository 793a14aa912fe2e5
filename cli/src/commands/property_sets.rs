use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use serde_json::{Map, Value};
use snmpkey_common::models::property_set::{self, PropertySet};
use snmpkey_common::success;
use snmpkey_core::property_sets::{self as writer, WritePolicy, Written};
use tracing::warn;

use crate::commands::connect::{self, Connection};
use crate::commands::{ConnectionArgs, Outcome, PropertySetCommand};
use crate::export;
use crate::mprint;
use crate::terminal::{format, print};

pub async fn property_sets(
    args: &ConnectionArgs,
    command: &PropertySetCommand,
) -> anyhow::Result<Outcome> {
    let conn = connect::connect(args, &args.config()).await?;

    let outcome = match command {
        PropertySetCommand::List => list(&conn).await,
        PropertySetCommand::Show { selector, output } => {
            show(&conn, selector, output.as_deref()).await
        }
        PropertySetCommand::Push { name, file, write } => {
            push(&conn, name, file, write.policy()).await
        }
    };

    connect::disconnect(&conn).await;
    outcome
}

async fn fetch_sets(conn: &Connection) -> anyhow::Result<Vec<PropertySet>> {
    conn.controller
        .list_property_sets(&conn.session)
        .await
        .context("listing property sets")
}

async fn list(conn: &Connection) -> anyhow::Result<Outcome> {
    let mut sets = fetch_sets(conn).await?;
    if sets.is_empty() {
        print::no_results("property sets");
        return Ok(Outcome::Complete);
    }

    sets.sort_by(|a, b| a.label.cmp(&b.label));
    for (idx, set) in sets.iter().enumerate() {
        print::tree_head(idx, &set.label);
        print::as_tree_one_level(format::property_set_to_details(set));
        if idx + 1 != sets.len() {
            mprint!();
        }
    }
    Ok(Outcome::Complete)
}

async fn show(conn: &Connection, selector: &str, output: Option<&Path>) -> anyhow::Result<Outcome> {
    let sets = fetch_sets(conn).await?;
    let Some(set) = property_set::find(&sets, selector) else {
        bail!("unknown property set `{selector}`");
    };

    let values = Value::Object(set.values.clone());
    print::tree_head(0, &set.label);
    print::as_tree_one_level(format::property_set_to_details(set));
    mprint!();
    for line in serde_json::to_string_pretty(&values)?.lines() {
        print::print(line);
    }

    if let Some(path) = output {
        export::write_json(path, &values)?;
        success!("values written to {}", path.display());
    }
    Ok(Outcome::Complete)
}

async fn push(
    conn: &Connection,
    name: &str,
    file: &Path,
    policy: WritePolicy,
) -> anyhow::Result<Outcome> {
    let values = read_values(file)?;
    let written = writer::write(conn.controller.as_ref(), &conn.session, name, values, policy)
        .await
        .with_context(|| format!("writing property set {name}"))?;

    match written {
        Written::Created(set) => success!("property set {} created", set.label),
        Written::Updated(set) => success!("property set {} updated", set.label),
        Written::Skipped(set) => {
            warn!("property set {} exists, use --overwrite or --merge to update it", set.label);
            return Ok(Outcome::Partial);
        }
    }
    Ok(Outcome::Complete)
}

/// Property set values must be a JSON object.
fn read_values(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_values(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn parse_values(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str(raw)? {
        Value::Object(values) => Ok(values),
        other => bail!("expected a JSON object, found {}", kind(&other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
