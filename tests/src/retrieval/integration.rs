#![cfg(test)]
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use snmpkey_common::error::{AuthError, ControllerError, DeviceCommandError, PropertySetError};
use snmpkey_common::models::blueprint::Blueprint;
use snmpkey_common::models::device::Device;
use snmpkey_common::models::report::{BulkReport, ExtractionResult, ExtractionStatus, FailureReason};
use snmpkey_core::property_sets::{self, WritePolicy, Written};
use snmpkey_core::retrieval::{RetrievalOptions, RetrievalService};
use snmpkey_protocols::KeyDecoder;
use tokio_util::sync::CancellationToken;

use crate::fake::{self, BLUEPRINT, FakeController, ids};

const AUTH_LINE: &str = "AUTH$1$YXV0aGtleTEyMw==";
const PRIV_LINE: &str = "PRIV$1$cHJpdmtleTQ1Ng==";

fn service(controller: Arc<FakeController>, concurrency: usize) -> RetrievalService {
    let options = RetrievalOptions {
        concurrency,
        ..RetrievalOptions::default()
    };
    RetrievalService::new(controller, KeyDecoder::default(), options)
}

fn both_keys() -> String {
    format!("{AUTH_LINE}\n{PRIV_LINE}\n")
}

#[tokio::test]
async fn one_timeout_does_not_spoil_the_batch() {
    let controller = Arc::new(
        FakeController::new()
            .with_output("a", &both_keys())
            .with_failure("b", DeviceCommandError::Timeout { attempts: 30 })
            .with_output("c", &both_keys()),
    );

    let report = service(controller, 8)
        .run_bulk(&fake::session(), BLUEPRINT, &ids(&["a", "b", "c"]), &CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<&str> = report.results().iter().map(|r| r.device_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);

    let a = report.get("a").unwrap();
    assert_eq!(a.status, ExtractionStatus::Succeeded);
    assert_eq!(a.auth_key.as_deref(), Some("authkey123"));
    assert_eq!(a.priv_key.as_deref(), Some("privkey456"));

    let b = report.get("b").unwrap();
    assert_eq!(b.status, ExtractionStatus::Failed);
    assert_eq!(b.command_error(), Some(&DeviceCommandError::Timeout { attempts: 30 }));
    assert!(b.auth_key.is_none() && b.priv_key.is_none() && b.keys.is_empty());
    assert!(b.raw_output.is_none());

    assert_eq!(report.get("c").unwrap().status, ExtractionStatus::Succeeded);
    assert!(!report.is_fully_successful());
    assert_eq!(report.failed_count(), 1);
}

#[tokio::test]
async fn report_order_follows_request_not_completion() {
    let controller = Arc::new(
        FakeController::new()
            .with_output("slow", AUTH_LINE)
            .with_output("fast", AUTH_LINE)
            .with_output("mid", AUTH_LINE)
            .with_delay("slow", Duration::from_millis(80))
            .with_delay("fast", Duration::from_millis(1))
            .with_delay("mid", Duration::from_millis(30)),
    );

    let report = service(controller, 8)
        .run_bulk(
            &fake::session(),
            BLUEPRINT,
            &ids(&["slow", "fast", "mid"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let order: Vec<&str> = report.results().iter().map(|r| r.device_id.as_str()).collect();
    assert_eq!(order, vec!["slow", "fast", "mid"]);
    assert!(report.is_fully_successful());
}

#[tokio::test]
async fn unknown_duplicate_and_unassigned_devices() {
    let unassigned = Device {
        system_id: None,
        ..fake::device("spare")
    };
    let controller = Arc::new(
        FakeController::new()
            .with_output("a", AUTH_LINE)
            .with_system(unassigned),
    );

    let report = service(controller.clone(), 8)
        .run_bulk(
            &fake::session(),
            BLUEPRINT,
            &ids(&["a", "ghost", "spare", "a"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(
        report.get("ghost").unwrap().command_error(),
        Some(&DeviceCommandError::NotInBlueprint(BLUEPRINT.to_string()))
    );
    assert_eq!(
        report.get("spare").unwrap().command_error(),
        Some(&DeviceCommandError::MissingSystemId)
    );
    assert!(report.get("a").unwrap().is_success());
    assert_eq!(controller.commands_issued(), 1);
}

#[tokio::test]
async fn garbage_lines_become_warnings() {
    let controller = Arc::new(
        FakeController::new()
            .with_output("mixed", &format!("{AUTH_LINE}\nGARBAGE\n"))
            .with_output("junk", "GARBAGE\n\n"),
    );

    let report = service(controller, 8)
        .run_bulk(&fake::session(), BLUEPRINT, &ids(&["mixed", "junk"]), &CancellationToken::new())
        .await
        .unwrap();

    let mixed = report.get("mixed").unwrap();
    assert!(mixed.is_success());
    assert_eq!(mixed.auth_key.as_deref(), Some("authkey123"));
    assert!(mixed.priv_key.is_none());
    assert_eq!(mixed.warnings.len(), 1);

    let junk = report.get("junk").unwrap();
    assert_eq!(junk.status, ExtractionStatus::Failed);
    assert_eq!(junk.failure, Some(FailureReason::NoDecodableKeys));
    assert_eq!(junk.raw_output.as_deref(), Some("GARBAGE\n\n"));
    assert_eq!(junk.warnings.len(), 1);
}

#[tokio::test]
async fn parallelism_stays_within_the_cap() {
    let mut controller = FakeController::new();
    let mut requested = Vec::new();
    for n in 0..12 {
        let id = format!("d{n}");
        controller = controller
            .with_output(&id, AUTH_LINE)
            .with_delay(&id, Duration::from_millis(15));
        requested.push(id);
    }
    let controller = Arc::new(controller);

    let report = service(controller.clone(), 3)
        .run_bulk(&fake::session(), BLUEPRINT, &requested, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.len(), 12);
    assert!(report.is_fully_successful());
    assert!(controller.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(controller.commands_issued(), 12);
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn cancellation_keeps_finished_devices() {
    let controller = Arc::new(
        FakeController::new()
            .with_output("quick", AUTH_LINE)
            .hanging("stuck"),
    );
    let cancel = cancel_after(Duration::from_millis(100));

    let report = service(controller, 8)
        .run_bulk(&fake::session(), BLUEPRINT, &ids(&["quick", "stuck"]), &cancel)
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    assert!(report.get("quick").unwrap().is_success());
    assert_eq!(
        report.get("stuck").unwrap().command_error(),
        Some(&DeviceCommandError::Cancelled)
    );
}

#[tokio::test]
async fn cancellation_fails_in_flight_and_waiting_devices() {
    let controller = Arc::new(FakeController::new().hanging("first").hanging("second"));
    let cancel = cancel_after(Duration::from_millis(50));

    // A single slot: whichever device starts blocks the other one.
    let report = service(controller.clone(), 1)
        .run_bulk(&fake::session(), BLUEPRINT, &ids(&["first", "second"]), &cancel)
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    for res in report.results() {
        assert_eq!(res.command_error(), Some(&DeviceCommandError::Cancelled));
    }
    assert_eq!(controller.commands_issued(), 1);
}

#[tokio::test]
async fn cancelled_before_start_issues_nothing() {
    let controller = Arc::new(FakeController::new().with_output("a", AUTH_LINE));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = service(controller.clone(), 4)
        .run_bulk(&fake::session(), BLUEPRINT, &ids(&["a"]), &cancel)
        .await
        .unwrap();

    assert_eq!(
        report.get("a").unwrap().command_error(),
        Some(&DeviceCommandError::Cancelled)
    );
    assert_eq!(controller.commands_issued(), 0);
}

#[tokio::test]
async fn failed_listing_aborts_the_run() {
    let controller = Arc::new(
        FakeController::new()
            .failing_listing(ControllerError::Malformed("items missing".to_string())),
    );

    let err = service(controller, 4)
        .run_bulk(&fake::session(), BLUEPRINT, &ids(&["a"]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ControllerError::Malformed("items missing".to_string()));
}

#[tokio::test]
async fn lost_session_stops_the_run() {
    let lost = DeviceCommandError::Session(AuthError::Rejected {
        status: 401,
        message: "token revoked".to_string(),
    });
    let mut controller = FakeController::new();
    let mut requested = Vec::new();
    for n in 0..5 {
        let id = format!("d{n}");
        controller = controller.with_failure(&id, lost.clone());
        requested.push(id);
    }
    let controller = Arc::new(controller);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let err = service(controller.clone(), 1)
        .on_result(Box::new(move |_: &ExtractionResult| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .run_bulk(&fake::session(), BLUEPRINT, &requested, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Auth(AuthError::Rejected { status: 401, .. })));
    // Only the device holding the single slot reached the controller.
    assert_eq!(controller.commands_issued(), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn every_blueprint_is_visited_and_listing_failures_are_kept() {
    let controller = Arc::new(FakeController::new().with_output("a", AUTH_LINE));
    let blueprints = vec![
        Blueprint::new(BLUEPRINT, "dc1"),
        Blueprint::new("bp-gone", "dc2"),
    ];

    let runs = service(controller, 2)
        .run_blueprints(&fake::session(), &blueprints, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].blueprint.label, "dc1");
    assert!(runs[0].outcome.as_ref().unwrap().is_fully_successful());
    assert!(matches!(runs[1].outcome, Err(ControllerError::NotFound(_))));
}

#[tokio::test]
async fn lost_session_ends_a_multi_blueprint_run() {
    let controller = Arc::new(
        FakeController::new().failing_listing(ControllerError::Auth(AuthError::MissingToken)),
    );
    let blueprints = vec![Blueprint::new(BLUEPRINT, "dc1"), Blueprint::new("bp-2", "dc2")];

    let err = service(controller, 2)
        .run_blueprints(&fake::session(), &blueprints, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ControllerError::Auth(AuthError::MissingToken));
}

#[tokio::test]
async fn run_all_covers_every_system_and_reports_each_once() {
    let controller = Arc::new(
        FakeController::new()
            .with_output("a", AUTH_LINE)
            .with_failure("b", DeviceCommandError::Unreachable("no route".into())),
    );
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let report = service(controller, 2)
        .on_result(Box::new(move |_: &ExtractionResult| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .run_all(&fake::session(), BLUEPRINT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn only_succeeded_devices_are_persisted() {
    let controller = Arc::new(
        FakeController::new()
            .with_output("a", &both_keys())
            .with_failure("b", DeviceCommandError::RemoteFailure("denied".into())),
    );
    let session = fake::session();

    let report = service(controller.clone(), 2)
        .run_bulk(&session, BLUEPRINT, &ids(&["a", "b"]), &CancellationToken::new())
        .await
        .unwrap();
    let written = property_sets::persist(
        &*controller,
        &session,
        "snmp_auth",
        &report,
        WritePolicy::default(),
    )
    .await
    .unwrap();

    assert!(matches!(written, Written::Created(_)));
    assert_eq!(written.set().id.as_deref(), Some("ps-0"));
    let stored = controller.stored.lock().unwrap();
    let (name, values) = &stored[0];
    assert_eq!(name, "snmp_auth");
    let devices = values["snmp_auth"].as_object().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices["a.fabric"]["authentication_key"], "authkey123");
    assert_eq!(devices["a.fabric"]["system_id"], "SN-a");
}

#[tokio::test]
async fn nothing_is_persisted_when_every_device_failed() {
    let controller = Arc::new(
        FakeController::new().with_failure("a", DeviceCommandError::Timeout { attempts: 3 }),
    );
    let session = fake::session();

    let report = service(controller.clone(), 2)
        .run_bulk(&session, BLUEPRINT, &ids(&["a"]), &CancellationToken::new())
        .await
        .unwrap();
    let err = property_sets::persist(
        &*controller,
        &session,
        "snmp_auth",
        &report,
        WritePolicy::Overwrite,
    )
    .await
    .unwrap_err();

    assert_eq!(err, PropertySetError::Empty);
    assert!(controller.stored.lock().unwrap().is_empty());
}

async fn report_with_failed_device(controller: &Arc<FakeController>) -> BulkReport {
    service(controller.clone(), 2)
        .run_bulk(&fake::session(), BLUEPRINT, &ids(&["a", "b"]), &CancellationToken::new())
        .await
        .unwrap()
}

fn failing_b() -> FakeController {
    FakeController::new()
        .with_output("a", &both_keys())
        .with_failure("b", DeviceCommandError::Timeout { attempts: 30 })
}

#[tokio::test]
async fn existing_set_is_left_alone_by_default() {
    let controller = Arc::new(
        failing_b().with_property_set("snmp_auth", json!({ "snmp_auth": { "b.fabric": {} } })),
    );
    let report = report_with_failed_device(&controller).await;

    let written = property_sets::persist(
        &*controller,
        &fake::session(),
        "snmp_auth",
        &report,
        WritePolicy::default(),
    )
    .await
    .unwrap();

    assert!(matches!(written, Written::Skipped(_)));
    assert!(controller.stored.lock().unwrap().is_empty());
}

#[tokio::test]
async fn merge_keeps_keys_of_devices_that_failed_this_time() {
    let controller = Arc::new(failing_b().with_property_set(
        "snmp_auth",
        json!({ "snmp_auth": {
            "a.fabric": { "authentication_key": "stale" },
            "b.fabric": { "authentication_key": "kept" }
        } }),
    ));
    let report = report_with_failed_device(&controller).await;

    let written = property_sets::persist(
        &*controller,
        &fake::session(),
        "snmp_auth",
        &report,
        WritePolicy::Merge,
    )
    .await
    .unwrap();

    let Written::Updated(set) = written else {
        panic!("expected an update");
    };
    assert_eq!(set.values["snmp_auth"]["a.fabric"]["authentication_key"], "authkey123");
    assert_eq!(set.values["snmp_auth"]["b.fabric"]["authentication_key"], "kept");
}

#[tokio::test]
async fn overwrite_replaces_stored_values() {
    let controller = Arc::new(failing_b().with_property_set(
        "snmp_auth",
        json!({ "snmp_auth": { "b.fabric": { "authentication_key": "old" } } }),
    ));
    let report = report_with_failed_device(&controller).await;

    property_sets::persist(
        &*controller,
        &fake::session(),
        "snmp_auth",
        &report,
        WritePolicy::Overwrite,
    )
    .await
    .unwrap();

    let sets = controller.sets.lock().unwrap();
    let devices = sets[0].values["snmp_auth"].as_object().unwrap();
    assert_eq!(devices.len(), 1);
    assert!(devices.contains_key("a.fabric"));
}
