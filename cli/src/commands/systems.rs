use anyhow::Context;
use snmpkey_common::models::device::Device;

use crate::commands::connect;
use crate::commands::{ConnectionArgs, Outcome};
use crate::mprint;
use crate::terminal::{format, print};

pub async fn systems(args: &ConnectionArgs, blueprint: Option<&str>) -> anyhow::Result<Outcome> {
    let conn = connect::connect(args, &args.config()).await?;
    let blueprint = connect::resolve_blueprint(&conn, blueprint).await?;

    let mut devices: Vec<Device> = conn
        .controller
        .list_systems(&conn.session, &blueprint.id)
        .await
        .with_context(|| format!("listing systems of {blueprint}"))?;

    if devices.is_empty() {
        print::no_results("switch systems");
    } else {
        devices.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        print_devices(&devices);
    }

    connect::disconnect(&conn).await;
    Ok(Outcome::Complete)
}

fn print_devices(devices: &[Device]) {
    for (idx, device) in devices.iter().enumerate() {
        print::tree_head(idx, device.display_name());
        print::as_tree_one_level(format::device_to_details(device));
        if idx + 1 != devices.len() {
            mprint!();
        }
    }
}
