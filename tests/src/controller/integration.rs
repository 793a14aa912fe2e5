#![cfg(test)]
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value, json};
use snmpkey_common::config::{Config, DEFAULT_COMMAND};
use snmpkey_common::error::{AuthError, ControllerError, DeviceCommandError, PropertySetError};
use snmpkey_common::models::device::Device;
use snmpkey_core::controller::{ControllerApi, HttpController};
use snmpkey_core::retrieval::{RetrievalOptions, RetrievalService};
use snmpkey_core::session::{Credentials, Session};
use snmpkey_protocols::KeyDecoder;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> Config {
    Config {
        retry_backoff: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        max_poll_attempts: 3,
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

fn controller() -> HttpController {
    HttpController::new(&config()).unwrap()
}

fn session(server: &MockServer, token: &str) -> Session {
    Session::new(server.uri(), Credentials::new("admin", "pw"), token.to_string())
}

fn leaf(system_id: Option<&str>) -> Device {
    Device {
        id: "node-1".to_string(),
        label: "leaf1".to_string(),
        hostname: Some("leaf1".to_string()),
        system_id: system_id.map(str::to_string),
        role: Some("leaf".to_string()),
        blueprint_id: "bp-1".to_string(),
    }
}

async fn mount_login(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/aaa/login"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": token })))
        .expect(times)
        .mount(server)
        .await;
}

/*************************************************************
                   Session and retry handling
**************************************************************/

#[tokio::test]
async fn expired_token_is_renewed_once_and_request_replayed() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .and(header("AuthToken", "stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .and(header("AuthToken", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "bp-1", "label": "dc1" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, "stale");
    let blueprints = controller().list_blueprints(&session).await.unwrap();

    assert_eq!(blueprints.len(), 1);
    assert_eq!(session.token().await.value(), "fresh");
    assert_eq!(session.token().await.generation(), 1);
}

#[tokio::test]
async fn second_unauthorized_answer_is_final() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .expect(2)
        .mount(&server)
        .await;

    let err = controller()
        .list_blueprints(&session(&server, "stale"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ControllerError::Auth(AuthError::Rejected {
            status: 401,
            message: "token revoked".to_string()
        })
    );
}

#[tokio::test]
async fn concurrent_expiry_triggers_a_single_login() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .and(header("AuthToken", "stale"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .and(header("AuthToken", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let controller = Arc::new(controller());
    let session = Arc::new(session(&server, "stale"));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let controller = controller.clone();
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            controller.list_blueprints(&session).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_empty());
    }
    assert_eq!(session.token().await.generation(), 1);
}

#[tokio::test]
async fn server_errors_are_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "bp-1", "label": "dc1" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let blueprints = controller()
        .list_blueprints(&session(&server, "tok"))
        .await
        .unwrap();

    assert_eq!(blueprints[0].label, "dc1");
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(4)
        .mount(&server)
        .await;

    let err = controller()
        .list_blueprints(&session(&server, "tok"))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Status { status: 502, .. }));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let err = controller()
        .list_blueprints(&session(&server, "tok"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ControllerError::Status {
            status: 400,
            message: "bad request".to_string()
        }
    );
}

#[tokio::test]
async fn unreachable_controller_fails_login() {
    let err = controller()
        .login("http://127.0.0.1:1", "admin", SecretString::from("pw"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Unreachable(_)));
}

#[tokio::test]
async fn login_without_token_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/aaa/login"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "x" })))
        .mount(&server)
        .await;

    let err = controller()
        .login(&server.uri(), "admin", SecretString::from("pw"))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::MissingToken);
}

/*************************************************************
                       Systems listing
**************************************************************/

#[tokio::test]
async fn systems_come_from_the_graph_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/blueprints/bp-1/qe"))
        .and(body_json(json!({
            "query": "node(type='system', name='switch_nodes', system_type='switch')"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "switch_nodes": {
                    "id": "n1", "label": "leaf1", "hostname": "leaf1.dc1",
                    "system_id": "5254001A2B3C", "role": "leaf"
                } },
                { "switch_nodes": {
                    "id": "n2", "label": "spine1", "hostname": null,
                    "system_id": null, "role": "spine"
                } }
            ]
        })))
        .mount(&server)
        .await;

    let devices = controller()
        .list_systems(&session(&server, "tok"), "bp-1")
        .await
        .unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].system_id.as_deref(), Some("5254001A2B3C"));
    assert_eq!(devices[0].blueprint_id, "bp-1");
    assert_eq!(devices[1].system_id, None);
    assert_eq!(devices[1].display_name(), "spine1");
}

#[tokio::test]
async fn malformed_listing_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/blueprints"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = controller()
        .list_blueprints(&session(&server, "tok"))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Malformed(_)));
}

/*************************************************************
                       Remote commands
**************************************************************/

#[tokio::test]
async fn command_is_polled_until_done_then_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/telemetry/fetchcmd"))
        .and(body_json(json!({
            "system_id": "SN1",
            "output_format": "text",
            "command_text": DEFAULT_COMMAND,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "request_id": "req-7" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/telemetry/fetchcmd/req-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "pending" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/telemetry/fetchcmd/req-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "success",
            "output": "AUTH$1$YXV0aGtleTEyMw==\n"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/telemetry/fetchcmd/req-7"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let output = controller()
        .execute_command(&session(&server, "tok"), "bp-1", &leaf(Some("SN1")), DEFAULT_COMMAND)
        .await
        .unwrap();

    assert_eq!(output, "AUTH$1$YXV0aGtleTEyMw==\n");
}

#[tokio::test]
async fn command_that_never_finishes_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/telemetry/fetchcmd"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "request_id": "req-8" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/telemetry/fetchcmd/req-8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "pending" })))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/telemetry/fetchcmd/req-8"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = controller()
        .execute_command(&session(&server, "tok"), "bp-1", &leaf(Some("SN1")), "show version")
        .await
        .unwrap_err();

    assert_eq!(err, DeviceCommandError::Timeout { attempts: 3 });
}

#[tokio::test]
async fn device_without_system_id_is_never_contacted() {
    let server = MockServer::start().await;

    let err = controller()
        .execute_command(&session(&server, "tok"), "bp-1", &leaf(None), "show version")
        .await
        .unwrap_err();

    assert_eq!(err, DeviceCommandError::MissingSystemId);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_command_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/telemetry/fetchcmd"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unknown system"))
        .expect(1)
        .mount(&server)
        .await;

    let err = controller()
        .execute_command(&session(&server, "tok"), "bp-1", &leaf(Some("SN1")), "show version")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DeviceCommandError::Rejected {
            status: 422,
            message: "unknown system".to_string()
        }
    );
}

#[tokio::test]
async fn command_submission_is_not_resent_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/telemetry/fetchcmd"))
        .respond_with(ResponseTemplate::new(504).set_body_string("gateway timeout"))
        .expect(1)
        .mount(&server)
        .await;

    let err = controller()
        .execute_command(&session(&server, "tok"), "bp-1", &leaf(Some("SN1")), "show version")
        .await
        .unwrap_err();

    assert!(matches!(err, DeviceCommandError::Rejected { status: 504, .. }));
}

#[tokio::test]
async fn revoked_session_stops_a_bulk_run() {
    let server = MockServer::start().await;
    let nodes: Vec<Value> = (0..5)
        .map(|n| {
            json!({ "switch_nodes": {
                "id": format!("n{n}"), "label": format!("leaf{n}"),
                "hostname": format!("leaf{n}"), "system_id": format!("SN{n}"), "role": "leaf"
            } })
        })
        .collect();
    Mock::given(method("POST"))
        .and(path("/api/blueprints/bp-1/qe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": nodes })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/telemetry/fetchcmd"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/aaa/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("account locked"))
        .expect(1)
        .mount(&server)
        .await;

    let options = RetrievalOptions {
        concurrency: 1,
        ..RetrievalOptions::default()
    };
    let service = RetrievalService::new(Arc::new(controller()), KeyDecoder::default(), options);
    let err = service
        .run_all(&session(&server, "stale"), "bp-1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ControllerError::Auth(AuthError::Rejected {
            status: 401,
            message: "account locked".to_string()
        })
    );
}

/*************************************************************
                        Property sets
**************************************************************/

fn values() -> Map<String, Value> {
    let mut values = Map::new();
    values.insert(
        "snmp_auth".to_string(),
        json!({ "leaf1": { "system_id": "SN1", "authentication_key": "a", "privacy_key": "p" } }),
    );
    values
}

#[tokio::test]
async fn existing_property_set_is_updated_in_place() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/property-sets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "ps-0", "label": "other", "values": {} },
                { "id": "ps-1", "label": "snmp_auth", "values": { "old": true } }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/property-sets/ps-1"))
        .and(body_json(json!({ "label": "snmp_auth", "values": values() })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let set = controller()
        .upsert_property_set(&session(&server, "tok"), "snmp_auth", values())
        .await
        .unwrap();

    assert_eq!(set.id.as_deref(), Some("ps-1"));
    assert_eq!(set.values, values());
}

#[tokio::test]
async fn missing_property_set_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/property-sets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/property-sets"))
        .and(body_json(json!({ "label": "snmp_auth", "values": values() })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "ps-9" })))
        .expect(1)
        .mount(&server)
        .await;

    let set = controller()
        .upsert_property_set(&session(&server, "tok"), "snmp_auth", values())
        .await
        .unwrap();

    assert_eq!(set.id.as_deref(), Some("ps-9"));
    assert_eq!(set.label, "snmp_auth");
}

#[tokio::test]
async fn property_set_conflict_and_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/property-sets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/property-sets"))
        .respond_with(ResponseTemplate::new(409).set_body_string("label already used"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/property-sets"))
        .respond_with(ResponseTemplate::new(422).set_body_string("values must be an object"))
        .mount(&server)
        .await;

    let controller = controller();
    let session = session(&server, "tok");

    let conflict = controller
        .upsert_property_set(&session, "snmp_auth", values())
        .await
        .unwrap_err();
    let invalid = controller
        .upsert_property_set(&session, "snmp_auth", values())
        .await
        .unwrap_err();

    assert_eq!(conflict, PropertySetError::Conflict("label already used".to_string()));
    assert_eq!(
        invalid,
        PropertySetError::Validation {
            status: 422,
            message: "values must be an object".to_string()
        }
    );
}
