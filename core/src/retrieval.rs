//! # Bulk Retrieval
//!
//! Drives the key extraction for every requested device of a blueprint and collects the
//! outcomes into a [`BulkReport`].
//!
//! Each device walks its own small state machine (see [`Stage`]). Devices are worked on
//! concurrently up to [`RetrievalOptions::concurrency`], but every device owns exactly one
//! result slot reserved before any work starts, so the report always holds one entry per
//! requested device, in request order.
//!
//! A lost session is the one device failure that is not contained: it stops every device
//! that has not finished and fails the whole run.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use snmpkey_common::config::Config;
use snmpkey_common::error::{ControllerError, DeviceCommandError};
use snmpkey_common::models::blueprint::Blueprint;
use snmpkey_common::models::device::Device;
use snmpkey_common::models::key::DecodedKey;
use snmpkey_common::models::report::{BulkReport, ExtractionResult};
use snmpkey_protocols::KeyDecoder;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::controller::ControllerApi;
use crate::session::Session;

pub type ResultCallback = Box<dyn Fn(&ExtractionResult) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub concurrency: usize,
    pub command: String,
}

impl From<&Config> for RetrievalOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            concurrency: cfg.concurrency,
            command: cfg.command.clone(),
        }
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Outcome for one blueprint of a multi-blueprint run.
#[derive(Debug)]
pub struct BlueprintRun {
    pub blueprint: Blueprint,
    pub outcome: Result<BulkReport, ControllerError>,
}

/// Per-device progress. `Decoded`, `DecodeFailed` and `CommandFailed` are final.
enum Stage {
    Pending,
    CommandIssued,
    OutputReceived(String),
    Decoded {
        output: String,
        keys: Vec<DecodedKey>,
        warnings: Vec<String>,
    },
    DecodeFailed {
        output: String,
        warnings: Vec<String>,
    },
    CommandFailed(DeviceCommandError),
}

pub struct RetrievalService {
    controller: Arc<dyn ControllerApi>,
    decoder: KeyDecoder,
    options: RetrievalOptions,
    on_result: Option<ResultCallback>,
}

impl RetrievalService {
    pub fn new(controller: Arc<dyn ControllerApi>, decoder: KeyDecoder, options: RetrievalOptions) -> Self {
        Self {
            controller,
            decoder,
            options,
            on_result: None,
        }
    }

    /// Called once for every finalized device, in completion order.
    pub fn on_result(mut self, callback: ResultCallback) -> Self {
        self.on_result = Some(callback);
        self
    }

    /// Runs the extraction for every switch system of the blueprint.
    pub async fn run_all(
        &self,
        session: &Session,
        blueprint_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BulkReport, ControllerError> {
        let systems = self.controller.list_systems(session, blueprint_id).await?;
        let ids: Vec<String> = systems.iter().map(|device| device.id.clone()).collect();
        self.run_on(session, blueprint_id, &systems, &ids, cancel).await
    }

    /// Runs the extraction for `device_ids` against one snapshot of the blueprint's systems.
    ///
    /// A failing system listing or a lost session aborts the run. Everything else that goes
    /// wrong for a single device ends up in its result.
    pub async fn run_bulk(
        &self,
        session: &Session,
        blueprint_id: &str,
        device_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<BulkReport, ControllerError> {
        let systems = self.controller.list_systems(session, blueprint_id).await?;
        self.run_on(session, blueprint_id, &systems, device_ids, cancel).await
    }

    /// Runs [`Self::run_all`] for every blueprint, one blueprint after the other.
    ///
    /// A blueprint whose systems cannot be listed is recorded and skipped. A lost session
    /// stops everything. Blueprints not reached before `cancel` fires are left out.
    pub async fn run_blueprints(
        &self,
        session: &Session,
        blueprints: &[Blueprint],
        cancel: &CancellationToken,
    ) -> Result<Vec<BlueprintRun>, ControllerError> {
        let mut runs = Vec::with_capacity(blueprints.len());

        for blueprint in blueprints {
            if cancel.is_cancelled() {
                warn!(
                    skipped = blueprints.len() - runs.len(),
                    "run interrupted, remaining blueprints skipped"
                );
                break;
            }

            let span = info_span!("blueprint", id = %blueprint.id, label = %blueprint.label);
            let outcome = self
                .run_all(session, &blueprint.id, cancel)
                .instrument(span)
                .await;
            match &outcome {
                Err(ControllerError::Auth(err)) => return Err(ControllerError::Auth(err.clone())),
                Err(err) => warn!("skipping blueprint {blueprint}: {err}"),
                Ok(_) => {}
            }
            runs.push(BlueprintRun {
                blueprint: blueprint.clone(),
                outcome,
            });
        }
        Ok(runs)
    }

    async fn run_on(
        &self,
        session: &Session,
        blueprint_id: &str,
        systems: &[Device],
        device_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<BulkReport, ControllerError> {
        let requested = dedup(device_ids);
        info!(
            blueprint = blueprint_id,
            devices = requested.len(),
            concurrency = self.options.concurrency,
            "starting key retrieval"
        );

        let mut slots: Vec<Option<ExtractionResult>> = vec![None; requested.len()];
        let semaphore = Semaphore::new(self.options.concurrency.max(1));
        let semaphore = &semaphore;
        // Follows `cancel`, and is also tripped once the session is lost.
        let abort = cancel.child_token();
        let abort = &abort;
        let mut tasks = FuturesUnordered::new();

        for (idx, id) in requested.iter().enumerate() {
            let Some(device) = systems.iter().find(|device| device.id == **id) else {
                let err = DeviceCommandError::NotInBlueprint(blueprint_id.to_string());
                slots[idx] = Some(self.finalize(ExtractionResult::command_failed(id, None, err)));
                continue;
            };

            let span = info_span!("device", id = %device.id, name = device.display_name());
            tasks.push(
                async move {
                    let result = self
                        .extract(session, blueprint_id, device, semaphore, abort)
                        .await;
                    (idx, result)
                }
                .instrument(span),
            );
        }

        let mut session_lost = None;
        while let Some((idx, result)) = tasks.next().await {
            if let Some(DeviceCommandError::Session(err)) = result.command_error()
                && session_lost.is_none()
            {
                error!("controller session lost, stopping the run: {err}");
                session_lost = Some(err.clone());
                abort.cancel();
            }
            slots[idx] = Some(self.finalize(result));
        }

        if let Some(err) = session_lost {
            return Err(ControllerError::Auth(err));
        }

        let results = requested
            .iter()
            .zip(slots)
            .map(|(id, slot)| {
                slot.unwrap_or_else(|| {
                    ExtractionResult::command_failed(id, None, DeviceCommandError::Cancelled)
                })
            })
            .collect();

        let report = BulkReport::new(blueprint_id, results);
        info!(
            succeeded = report.len() - report.failed_count(),
            failed = report.failed_count(),
            "key retrieval finished"
        );
        Ok(report)
    }

    async fn extract(
        &self,
        session: &Session,
        blueprint_id: &str,
        device: &Device,
        semaphore: &Semaphore,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let mut _permit: Option<SemaphorePermit<'_>> = None;
        let mut stage = Stage::Pending;

        loop {
            stage = match stage {
                Stage::Pending if device.system_id.is_none() => {
                    Stage::CommandFailed(DeviceCommandError::MissingSystemId)
                }
                Stage::Pending => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Stage::CommandFailed(DeviceCommandError::Cancelled),
                    permit = semaphore.acquire() => match permit {
                        Ok(permit) => {
                            _permit = Some(permit);
                            Stage::CommandIssued
                        }
                        Err(_) => Stage::CommandFailed(DeviceCommandError::Cancelled),
                    },
                },
                Stage::CommandIssued => {
                    debug!("issuing extraction command");
                    let command = self.controller.execute_command(
                        session,
                        blueprint_id,
                        device,
                        &self.options.command,
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Stage::CommandFailed(DeviceCommandError::Cancelled),
                        outcome = command => match outcome {
                            Ok(output) => Stage::OutputReceived(output),
                            Err(err) => Stage::CommandFailed(err),
                        },
                    }
                }
                Stage::OutputReceived(output) => {
                    let (keys, warnings) = decode_output(&self.decoder, &output);
                    if keys.is_empty() {
                        Stage::DecodeFailed { output, warnings }
                    } else {
                        Stage::Decoded {
                            output,
                            keys,
                            warnings,
                        }
                    }
                }
                Stage::Decoded {
                    output,
                    keys,
                    warnings,
                } => {
                    debug!(keys = keys.len(), warnings = warnings.len(), "keys decoded");
                    return ExtractionResult::succeeded(device, output, keys, warnings);
                }
                Stage::DecodeFailed { output, warnings } => {
                    warn!(warnings = warnings.len(), "no decodable key in command output");
                    return ExtractionResult::undecodable(device, output, warnings);
                }
                Stage::CommandFailed(err) => {
                    debug!("command failed: {err}");
                    return ExtractionResult::command_failed(&device.id, Some(device), err);
                }
            };
        }
    }

    fn finalize(&self, result: ExtractionResult) -> ExtractionResult {
        if let Some(callback) = &self.on_result {
            callback(&result);
        }
        result
    }
}

/// Decodes every non-blank line. Lines that fail are returned as warnings.
pub fn decode_output(decoder: &KeyDecoder, output: &str) -> (Vec<DecodedKey>, Vec<String>) {
    let mut keys = Vec::new();
    let mut warnings = Vec::new();

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match decoder.decode(line) {
            Ok(key) => keys.push(key),
            Err(err) => warnings.push(format!("{line}: {err}")),
        }
    }
    (keys, warnings)
}

/// Keeps the first occurrence of every identifier.
fn dedup(device_ids: &[String]) -> Vec<&String> {
    let mut seen = std::collections::HashSet::new();
    device_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
