//! # Controller Port
//!
//! [`ControllerApi`] is everything the orchestrator and the CLI need from the fabric
//! controller. [`http::HttpController`] implements it against the REST API; tests swap
//! in fakes.

pub mod http;
pub mod retry;
mod wire;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Map, Value};
use snmpkey_common::error::{AuthError, ControllerError, DeviceCommandError, PropertySetError};
use snmpkey_common::models::blueprint::Blueprint;
use snmpkey_common::models::device::Device;
use snmpkey_common::models::property_set::PropertySet;

use crate::session::Session;

pub use http::HttpController;

#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// Authenticates and returns a session bound to `server`.
    async fn login(
        &self,
        server: &str,
        username: &str,
        password: SecretString,
    ) -> Result<Session, AuthError>;

    /// Invalidates the session on the controller. Best effort.
    async fn logout(&self, _session: &Session) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn list_blueprints(&self, session: &Session) -> Result<Vec<Blueprint>, ControllerError>;

    /// Switch systems of one blueprint, as a snapshot.
    async fn list_systems(
        &self,
        session: &Session,
        blueprint_id: &str,
    ) -> Result<Vec<Device>, ControllerError>;

    /// Runs `command` on `device` and returns its raw text output.
    async fn execute_command(
        &self,
        session: &Session,
        blueprint_id: &str,
        device: &Device,
        command: &str,
    ) -> Result<String, DeviceCommandError>;

    async fn list_property_sets(&self, session: &Session) -> Result<Vec<PropertySet>, PropertySetError>;

    async fn create_property_set(
        &self,
        session: &Session,
        name: &str,
        values: Map<String, Value>,
    ) -> Result<PropertySet, PropertySetError>;

    /// Replaces label and values of the property set `id`.
    async fn update_property_set(
        &self,
        session: &Session,
        id: &str,
        name: &str,
        values: Map<String, Value>,
    ) -> Result<PropertySet, PropertySetError>;

    /// Creates the property set labelled `name`, or replaces the values of the existing one.
    async fn upsert_property_set(
        &self,
        session: &Session,
        name: &str,
        values: Map<String, Value>,
    ) -> Result<PropertySet, PropertySetError> {
        let existing = self
            .list_property_sets(session)
            .await?
            .into_iter()
            .find(|set| set.label == name)
            .and_then(|set| set.id);

        match existing {
            Some(id) => self.update_property_set(session, &id, name, values).await,
            None => self.create_property_set(session, name, values).await,
        }
    }
}
