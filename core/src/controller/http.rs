//! # Controller HTTP Adapter
//!
//! [`HttpController`] talks to the controller REST API with `reqwest`.
//!
//! Every authenticated request goes through [`HttpController::send`], which
//! * refreshes the session up front when the token is known to be expired,
//! * retries transient failures (connect errors, timeouts, 5xx) with exponential backoff,
//!   except for requests that create something, which are only resent when they never
//!   reached the controller (see [`Replay`]),
//! * answers a `401` with a single re-login through the session and replays the request once.
//!
//! Nothing else is retried. A second `401` is final.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use snmpkey_common::config::Config;
use snmpkey_common::error::{AuthError, ControllerError, DeviceCommandError, PropertySetError};
use snmpkey_common::models::blueprint::Blueprint;
use snmpkey_common::models::device::Device;
use snmpkey_common::models::property_set::PropertySet;
use tracing::{debug, info, warn};

use super::ControllerApi;
use super::retry::{Replay, RetryPolicy, is_transient_error, is_transient_status};
use super::wire::{
    BlueprintItem, Created, FetchCommandAccepted, FetchCommandRequest, FetchCommandStatus, Items,
    JobState, LoginRequest, LoginResponse, PropertySetBody, QueryRequest, QueryRow, SWITCH_QUERY,
};
use crate::session::{Credentials, EXPIRY_GRACE, Session, Token};

const AUTH_HEADER: &str = "AuthToken";
const OUTPUT_FORMAT: &str = "text";

/// Failure of one authenticated request, before it is mapped to the caller's error type.
#[derive(Debug)]
enum ApiError {
    Auth(AuthError),
    Status { status: StatusCode, message: String },
    Transport(String),
    Payload(String),
}

impl From<ApiError> for ControllerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(err) => ControllerError::Auth(err),
            ApiError::Status { status, message } => ControllerError::Status {
                status: status.as_u16(),
                message,
            },
            ApiError::Transport(msg) => ControllerError::Transport(msg),
            ApiError::Payload(msg) => ControllerError::Malformed(msg),
        }
    }
}

impl From<ApiError> for DeviceCommandError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(err) => DeviceCommandError::Session(err),
            ApiError::Status { status, message } => DeviceCommandError::Rejected {
                status: status.as_u16(),
                message,
            },
            ApiError::Transport(msg) => DeviceCommandError::Unreachable(msg),
            ApiError::Payload(msg) => {
                DeviceCommandError::RemoteFailure(format!("unexpected response: {msg}"))
            }
        }
    }
}

impl From<ApiError> for PropertySetError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(err) => PropertySetError::Session(err),
            ApiError::Status { status, message } if status == StatusCode::CONFLICT => {
                PropertySetError::Conflict(message)
            }
            ApiError::Status { status, message } if status.is_client_error() => {
                PropertySetError::Validation {
                    status: status.as_u16(),
                    message,
                }
            }
            ApiError::Status { status, message } => {
                PropertySetError::Transport(format!("controller returned {status}: {message}"))
            }
            ApiError::Transport(msg) => PropertySetError::Transport(msg),
            ApiError::Payload(msg) => PropertySetError::Transport(format!("unexpected response: {msg}")),
        }
    }
}

pub struct HttpController {
    client: Client,
    retry: RetryPolicy,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl HttpController {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        if !cfg.verify_tls {
            warn!("TLS certificate verification is disabled");
        }
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .danger_accept_invalid_certs(!cfg.verify_tls)
            .build()?;

        Ok(Self {
            client,
            retry: RetryPolicy::from(cfg),
            poll_interval: cfg.poll_interval,
            max_poll_attempts: cfg.max_poll_attempts,
        })
    }

    /// Posts the credentials and returns the raw token.
    pub async fn authenticate(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<String, AuthError> {
        let url = format!("{base_url}/api/aaa/login");
        let body = LoginRequest {
            username: &credentials.username,
            password: credentials.password.expose_secret(),
        };

        let mut retry = 0;
        let response = loop {
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) if is_transient_status(resp.status()) && self.retry.allows(retry) => {
                    self.backoff(retry, resp.status().as_str()).await;
                }
                Ok(resp) => break resp,
                Err(err) if is_transient_error(&err) && self.retry.allows(retry) => {
                    self.backoff(retry, &err.to_string()).await;
                }
                Err(err) => return Err(AuthError::Unreachable(err.to_string())),
            }
            retry += 1;
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(AuthError::Unreachable(format!("controller returned {status}")));
        }
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|_| AuthError::MissingToken)?;
        login
            .token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)
    }

    async fn backoff(&self, retry: u32, reason: &str) {
        let delay = self.retry.delay(retry);
        warn!(
            retry = retry + 1,
            max_retries = self.retry.max_retries,
            delay_ms = delay.as_millis() as u64,
            "transient controller failure ({reason}), retrying"
        );
        tokio::time::sleep(delay).await;
    }

    async fn relogin(&self, session: &Session, stale: &Token) -> Result<Token, ApiError> {
        session
            .refresh(stale, || {
                self.authenticate(session.base_url(), session.credentials())
            })
            .await
            .map_err(ApiError::Auth)
    }

    async fn send<B>(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        body: Option<&B>,
        replay: Replay,
    ) -> Result<Response, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let mut token = session.token().await;
        if token.is_expired(EXPIRY_GRACE) {
            debug!("token about to expire, logging in again");
            token = self.relogin(session, &token).await?;
        }

        let url = session.url(path);
        let mut replayed = false;
        let mut retry = 0;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(AUTH_HEADER, token.value());
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                    if replayed {
                        return Err(ApiError::Auth(AuthError::Rejected {
                            status: StatusCode::UNAUTHORIZED.as_u16(),
                            message: error_message(resp).await,
                        }));
                    }
                    debug!(%method, path, "token rejected, logging in again");
                    replayed = true;
                    token = self.relogin(session, &token).await?;
                    continue;
                }
                Ok(resp) if replay.retries_status(resp.status()) && self.retry.allows(retry) => {
                    self.backoff(retry, resp.status().as_str()).await;
                }
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    return Err(ApiError::Status {
                        status,
                        message: error_message(resp).await,
                    });
                }
                Err(err) if replay.retries_error(&err) && self.retry.allows(retry) => {
                    self.backoff(retry, &err.to_string()).await;
                }
                Err(err) => return Err(ApiError::Transport(err.to_string())),
            }
            retry += 1;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<T, ApiError> {
        let resp = self
            .send(session, Method::GET, path, None::<&()>, Replay::Safe)
            .await?;
        parse(resp).await
    }

    async fn send_json<B, T>(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        body: &B,
        replay: Replay,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.send(session, method, path, Some(body), replay).await?;
        parse(resp).await
    }

    async fn poll_command(
        &self,
        session: &Session,
        request_id: &str,
    ) -> Result<String, DeviceCommandError> {
        let path = format!("/api/telemetry/fetchcmd/{request_id}?keep=true");

        for attempt in 1..=self.max_poll_attempts {
            let status: FetchCommandStatus = self.get_json(session, &path).await?;
            match status.state() {
                JobState::Done(output) => return Ok(output),
                JobState::Failed(reason) => return Err(DeviceCommandError::RemoteFailure(reason)),
                JobState::Running => {
                    debug!(request_id, attempt, max = self.max_poll_attempts, "command still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(DeviceCommandError::Timeout {
            attempts: self.max_poll_attempts,
        })
    }

    async fn delete_command(&self, session: &Session, request_id: &str) {
        let path = format!("/api/telemetry/fetchcmd/{request_id}");
        match self
            .send(session, Method::DELETE, &path, None::<&()>, Replay::Safe)
            .await
        {
            Ok(_) => debug!(request_id, "command job deleted"),
            Err(err) => warn!(request_id, "could not delete command job: {err:?}"),
        }
    }
}

#[async_trait]
impl ControllerApi for HttpController {
    async fn login(
        &self,
        server: &str,
        username: &str,
        password: SecretString,
    ) -> Result<Session, AuthError> {
        let base_url = normalize_server(server);
        let credentials = Credentials {
            username: username.to_string(),
            password,
        };

        let token = self.authenticate(&base_url, &credentials).await?;
        info!(server = %base_url, user = username, "logged in to controller");
        Ok(Session::new(base_url, credentials, token))
    }

    async fn logout(&self, session: &Session) -> Result<(), ControllerError> {
        self.send(session, Method::POST, "/api/aaa/logout", None::<&()>, Replay::Safe)
            .await?;
        debug!("logged out of controller");
        Ok(())
    }

    async fn list_blueprints(&self, session: &Session) -> Result<Vec<Blueprint>, ControllerError> {
        let items: Items<BlueprintItem> = self.get_json(session, "/api/blueprints").await?;
        Ok(items.items.into_iter().map(Blueprint::from).collect())
    }

    async fn list_systems(
        &self,
        session: &Session,
        blueprint_id: &str,
    ) -> Result<Vec<Device>, ControllerError> {
        let path = format!("/api/blueprints/{blueprint_id}/qe");
        let query = QueryRequest { query: SWITCH_QUERY };

        let rows: Items<QueryRow> = match self
            .send_json(session, Method::POST, &path, &query, Replay::Safe)
            .await
        {
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(ControllerError::NotFound(format!("blueprint {blueprint_id}")));
            }
            other => other?,
        };

        Ok(rows
            .items
            .into_iter()
            .filter_map(|row| row.switch_nodes)
            .map(|node| node.into_device(blueprint_id))
            .collect())
    }

    async fn execute_command(
        &self,
        session: &Session,
        blueprint_id: &str,
        device: &Device,
        command: &str,
    ) -> Result<String, DeviceCommandError> {
        let system_id = device
            .system_id
            .as_deref()
            .ok_or(DeviceCommandError::MissingSystemId)?;
        if device.blueprint_id != blueprint_id {
            return Err(DeviceCommandError::NotInBlueprint(blueprint_id.to_string()));
        }

        let request = FetchCommandRequest {
            system_id,
            output_format: OUTPUT_FORMAT,
            command_text: command,
        };
        let accepted: FetchCommandAccepted = self
            .send_json(
                session,
                Method::POST,
                "/api/telemetry/fetchcmd",
                &request,
                Replay::ConnectOnly,
            )
            .await?;
        let request_id = accepted.request_id.ok_or_else(|| {
            DeviceCommandError::RemoteFailure("controller returned no request id".to_string())
        })?;
        debug!(device = device.display_name(), %request_id, "command submitted");

        let outcome = self.poll_command(session, &request_id).await;
        self.delete_command(session, &request_id).await;
        outcome
    }

    async fn list_property_sets(&self, session: &Session) -> Result<Vec<PropertySet>, PropertySetError> {
        let sets: Items<PropertySet> = self.get_json(session, "/api/property-sets").await?;
        Ok(sets.items)
    }

    async fn create_property_set(
        &self,
        session: &Session,
        name: &str,
        values: Map<String, Value>,
    ) -> Result<PropertySet, PropertySetError> {
        debug!(property_set = name, "creating property set");
        let body = PropertySetBody {
            label: name,
            values: &values,
        };
        let created: Created = self
            .send_json(session, Method::POST, "/api/property-sets", &body, Replay::ConnectOnly)
            .await?;
        let id = created.id.ok_or_else(|| {
            PropertySetError::Transport("controller returned no property set id".to_string())
        })?;

        let mut set = PropertySet::new(name, values);
        set.id = Some(id);
        Ok(set)
    }

    async fn update_property_set(
        &self,
        session: &Session,
        id: &str,
        name: &str,
        values: Map<String, Value>,
    ) -> Result<PropertySet, PropertySetError> {
        debug!(property_set = name, id, "updating existing property set");
        let body = PropertySetBody {
            label: name,
            values: &values,
        };
        let path = format!("/api/property-sets/{id}");
        self.send(session, Method::PUT, &path, Some(&body), Replay::Safe)
            .await?;

        let mut set = PropertySet::new(name, values);
        set.id = Some(id.to_string());
        Ok(set)
    }
}

/// `host[:port]` becomes `https://host[:port]`. Explicit schemes are kept.
pub fn normalize_server(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{server}")
    }
}

async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Payload(e.to_string()))
}

async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.text().await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
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
