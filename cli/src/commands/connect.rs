use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, bail};
use console::Term;
use dialoguer::{Input, Password, Select};
use secrecy::SecretString;
use snmpkey_common::config::Config;
use snmpkey_common::models::blueprint::{self, Blueprint};
use snmpkey_common::success;
use snmpkey_core::controller::{ControllerApi, HttpController};
use snmpkey_core::session::Session;
use tracing::{Instrument, debug, info_span};

use crate::commands::ConnectionArgs;
use crate::terminal::progress;

/// A logged in controller.
pub struct Connection {
    pub controller: Arc<dyn ControllerApi>,
    pub session: Session,
}

pub async fn connect(args: &ConnectionArgs, cfg: &Config) -> anyhow::Result<Connection> {
    let server = args
        .server
        .as_deref()
        .filter(|server| !server.trim().is_empty())
        .context("no controller given, use --server or APSTRA_SERVER")?;

    let username = match &args.username {
        Some(username) => username.clone(),
        None => prompt_username()?,
    };
    let password = match &args.password {
        Some(password) => SecretString::from(password.clone()),
        None => prompt_password(&username)?,
    };

    let controller: Arc<dyn ControllerApi> =
        Arc::new(HttpController::new(cfg).context("building the HTTP client")?);

    let span = info_span!("login", indicatif.pb_show = true);
    progress::start_spinner(&span, &format!("logging in to {server}..."));
    let session = controller
        .login(server, &username, password)
        .instrument(span)
        .await
        .with_context(|| format!("login to {server} failed"))?;

    success!("logged in to {} as {}", session.base_url(), username);
    Ok(Connection {
        controller,
        session,
    })
}

pub async fn disconnect(conn: &Connection) {
    if let Err(err) = conn.controller.logout(&conn.session).await {
        debug!("logout failed: {err}");
    }
}

/// Picks the blueprint named by `selector`, or lets the user choose one.
pub async fn resolve_blueprint(
    conn: &Connection,
    selector: Option<&str>,
) -> anyhow::Result<Blueprint> {
    let blueprints = conn
        .controller
        .list_blueprints(&conn.session)
        .await
        .context("listing blueprints")?;

    match selector {
        Some(selector) => blueprint::find(&blueprints, selector)
            .cloned()
            .with_context(|| format!("unknown blueprint `{selector}`")),
        None => match blueprints.as_slice() {
            [] => bail!("the controller has no blueprints"),
            [only] => Ok(only.clone()),
            _ if interactive() => select_blueprint(&blueprints),
            _ => bail!("several blueprints exist, pick one with --blueprint"),
        },
    }
}

fn select_blueprint(blueprints: &[Blueprint]) -> anyhow::Result<Blueprint> {
    let idx = Select::new()
        .with_prompt("Blueprint")
        .items(blueprints)
        .default(0)
        .interact()
        .context("blueprint selection aborted")?;
    Ok(blueprints[idx].clone())
}

fn prompt_username() -> anyhow::Result<String> {
    if !interactive() {
        bail!("no username given, use --username or APSTRA_USERNAME");
    }
    let username: String = Input::new()
        .with_prompt("Username")
        .interact_text()
        .context("reading username")?;
    Ok(username)
}

fn prompt_password(username: &str) -> anyhow::Result<SecretString> {
    if !interactive() {
        bail!("no password given, use --password or APSTRA_PASSWORD");
    }
    let password = Password::new()
        .with_prompt(format!("Password for {username}"))
        .interact()
        .context("reading password")?;
    Ok(SecretString::from(password))
}

/// Prompts read from stdin and draw on stderr.
fn interactive() -> bool {
    std::io::stdin().is_terminal() && Term::stderr().is_term()
}
