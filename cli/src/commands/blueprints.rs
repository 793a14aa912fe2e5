use anyhow::Context;

use crate::commands::connect;
use crate::commands::{ConnectionArgs, Outcome};
use crate::terminal::print;

pub async fn blueprints(args: &ConnectionArgs) -> anyhow::Result<Outcome> {
    let conn = connect::connect(args, &args.config()).await?;
    let blueprints = conn
        .controller
        .list_blueprints(&conn.session)
        .await
        .context("listing blueprints")?;

    if blueprints.is_empty() {
        print::no_results("blueprints");
    } else {
        print::set_key_width(blueprints.iter().map(|bp| bp.label.as_str()));
        for bp in &blueprints {
            print::aligned_line(&bp.label, bp.id.as_str());
        }
    }

    connect::disconnect(&conn).await;
    Ok(Outcome::Complete)
}
