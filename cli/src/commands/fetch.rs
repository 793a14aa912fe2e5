use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use colored::*;
use snmpkey_common::config::Config;
use snmpkey_common::error::PropertySetError;
use snmpkey_common::models::report::{BulkReport, ExtractionResult};
use snmpkey_common::success;
use snmpkey_core::property_sets::{self, WritePolicy, Written};
use snmpkey_core::retrieval::{BlueprintRun, RetrievalOptions, RetrievalService};
use snmpkey_protocols::KeyDecoder;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::commands::connect::{self, Connection};
use crate::commands::decode::load_decoder;
use crate::commands::{ConnectionArgs, FetchArgs, Outcome};
use crate::export;
use crate::mprint;
use crate::terminal::{colors, format, print, progress};

pub async fn fetch(args: &ConnectionArgs, fetch: &FetchArgs) -> anyhow::Result<Outcome> {
    let cfg = fetch.apply(args.config());
    let decoder = load_decoder(fetch.formats.as_deref())?;

    let conn = connect::connect(args, &cfg).await?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let outcome = if fetch.all_blueprints {
        fetch_every_blueprint(&conn, &cfg, fetch, decoder, &cancel).await
    } else {
        fetch_blueprint(&conn, &cfg, fetch, decoder, &cancel).await
    };

    connect::disconnect(&conn).await;
    outcome
}

async fn fetch_blueprint(
    conn: &Connection,
    cfg: &Config,
    fetch: &FetchArgs,
    decoder: KeyDecoder,
    cancel: &CancellationToken,
) -> anyhow::Result<Outcome> {
    let blueprint = connect::resolve_blueprint(conn, fetch.blueprint.as_deref()).await?;
    info!("using blueprint {blueprint}");

    let start_time = Instant::now();
    let report = {
        let span = info_span!("fetch", indicatif.pb_show = true);
        let requested = (!fetch.devices.is_empty()).then(|| unique_count(&fetch.devices));
        progress::start_device_bar(&span, requested);

        let service = retrieval_service(conn, cfg, decoder, &span);
        let run = async {
            if fetch.devices.is_empty() {
                debug!("no devices given, using every switch of the blueprint");
                service.run_all(&conn.session, &blueprint.id, cancel).await
            } else {
                service
                    .run_bulk(&conn.session, &blueprint.id, &fetch.devices, cancel)
                    .await
            }
        };
        run.instrument(span)
            .await
            .with_context(|| format!("key retrieval in {blueprint} aborted"))?
    };

    let interrupted = cancel.is_cancelled();
    if interrupted {
        warn!("run interrupted, the report is partial");
    }

    mprint!();
    print::header("results");
    print_results(&report);
    print_summary(&[&report], start_time.elapsed());

    export::write_report(&fetch.output, &report)?;
    success!("report written to {}", fetch.output.display());

    let stored = match &fetch.property_set {
        Some(_) if interrupted => {
            warn!("property set not updated because the run was interrupted");
            None
        }
        Some(_) => {
            let policy = fetch.write.policy();
            Some(store_property_set(conn, &cfg.property_set_name, &report, policy).await?)
        }
        None => None,
    };

    Ok(run_outcome(&report, interrupted, stored.as_ref()))
}

async fn fetch_every_blueprint(
    conn: &Connection,
    cfg: &Config,
    fetch: &FetchArgs,
    decoder: KeyDecoder,
    cancel: &CancellationToken,
) -> anyhow::Result<Outcome> {
    let blueprints = conn
        .controller
        .list_blueprints(&conn.session)
        .await
        .context("listing blueprints")?;
    if blueprints.is_empty() {
        print::no_results("blueprints");
        return Ok(Outcome::Complete);
    }
    info!("processing {} blueprint(s)", blueprints.len());

    let start_time = Instant::now();
    let runs = {
        let span = info_span!("fetch", indicatif.pb_show = true);
        progress::start_device_bar(&span, None);

        let service = retrieval_service(conn, cfg, decoder, &span);
        service
            .run_blueprints(&conn.session, &blueprints, cancel)
            .instrument(span)
            .await
            .context("key retrieval aborted")?
    };

    let interrupted = cancel.is_cancelled();
    if interrupted {
        warn!("run interrupted, the report is partial");
    }

    let mut reports = Vec::new();
    for run in &runs {
        mprint!();
        print::header(&run.blueprint.label);
        match &run.outcome {
            Ok(report) => {
                print_results(report);
                reports.push(report);
            }
            Err(err) => print::print_status(err.to_string().color(colors::FAILED).to_string()),
        }
    }
    print_summary(&reports, start_time.elapsed());

    export::write_json(&fetch.output, &export::blueprint_runs_to_json(&runs))?;
    success!("report written to {}", fetch.output.display());

    if fetch.property_set.is_some() && interrupted {
        warn!("property sets not updated because the run was interrupted");
    }

    let mut outcome = if runs.len() < blueprints.len() {
        Outcome::Partial
    } else {
        Outcome::Complete
    };
    for run in &runs {
        outcome = outcome.and(blueprint_outcome(conn, cfg, fetch, run, interrupted).await?);
    }
    Ok(outcome)
}

async fn blueprint_outcome(
    conn: &Connection,
    cfg: &Config,
    fetch: &FetchArgs,
    run: &BlueprintRun,
    interrupted: bool,
) -> anyhow::Result<Outcome> {
    let report = match &run.outcome {
        Ok(report) => report,
        Err(err) => {
            error!("{}: {err}", run.blueprint);
            return Ok(Outcome::Partial);
        }
    };

    let stored = if fetch.property_set.is_some() && !interrupted {
        let name = property_sets::blueprint_set_name(&run.blueprint.label, &cfg.property_set_name);
        Some(store_property_set(conn, &name, report, fetch.write.policy()).await?)
    } else {
        None
    };
    Ok(run_outcome(report, interrupted, stored.as_ref()))
}

fn retrieval_service(
    conn: &Connection,
    cfg: &Config,
    decoder: KeyDecoder,
    bar: &Span,
) -> RetrievalService {
    let bar = bar.clone();
    RetrievalService::new(conn.controller.clone(), decoder, RetrievalOptions::from(cfg)).on_result(
        Box::new(move |res: &ExtractionResult| {
            progress::report_device_done(&bar, res);
            log_result(res);
        }),
    )
}

/// Exit status of a finished run: every device succeeded, the run was not interrupted and
/// the property set, when asked for, was written or had nothing to write.
fn run_outcome(
    report: &BulkReport,
    interrupted: bool,
    stored: Option<&Result<Written, PropertySetError>>,
) -> Outcome {
    let stored_ok = match stored {
        None | Some(Ok(_)) | Some(Err(PropertySetError::Empty)) => true,
        Some(Err(_)) => false,
    };
    if report.is_fully_successful() && !interrupted && stored_ok {
        Outcome::Complete
    } else {
        Outcome::Partial
    }
}

fn unique_count(ids: &[String]) -> usize {
    ids.iter().collect::<HashSet<_>>().len()
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            cancel.cancel();
        }
    });
}

fn log_result(res: &ExtractionResult) {
    let name = res.display_name();
    for warning in &res.warnings {
        debug!("{name}: {warning}");
    }
    match &res.failure {
        None => success!("{name}: keys retrieved"),
        Some(failure) => warn!("{name}: {failure}"),
    }
}

/// Logs how the write went. Only a lost session is returned as an error.
async fn store_property_set(
    conn: &Connection,
    name: &str,
    report: &BulkReport,
    policy: WritePolicy,
) -> anyhow::Result<Result<Written, PropertySetError>> {
    let stored =
        property_sets::persist(conn.controller.as_ref(), &conn.session, name, report, policy).await;

    match &stored {
        Ok(Written::Created(set)) => success!("keys stored in new property set {}", set.label),
        Ok(Written::Updated(set)) => success!("keys stored in property set {}", set.label),
        Ok(Written::Skipped(set)) => {
            warn!("property set {} exists, use --overwrite or --merge to update it", set.label)
        }
        Err(PropertySetError::Empty) => warn!("no device succeeded, property set {name} left untouched"),
        Err(PropertySetError::Session(err)) => bail!("controller session lost: {err}"),
        Err(err) => error!("could not store property set {name}: {err}"),
    }
    Ok(stored)
}

fn print_results(report: &BulkReport) {
    if report.is_empty() {
        print::no_results("switch systems");
        return;
    }
    for (idx, res) in report.results().iter().enumerate() {
        print::tree_head(idx, res.display_name());
        print::as_tree_one_level(format::result_to_details(res));
        if idx + 1 != report.len() {
            mprint!();
        }
    }
}

fn print_summary(reports: &[&BulkReport], total_time: Duration) {
    let devices: usize = reports.iter().map(|report| report.len()).sum();
    let failed: usize = reports.iter().map(|report| report.failed_count()).sum();

    let succeeded: ColoredString = format!("{} succeeded", devices - failed).bold().green();
    let failed: ColoredString = if failed == 0 {
        format!("{failed} failed").normal()
    } else {
        format!("{failed} failed").bold().red()
    };
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output: ColoredString = format!("Retrieval Complete: {succeeded}, {failed} in {total_time}")
        .color(colors::TEXT_DEFAULT);

    print::fat_separator();
    print::centerln(&output.to_string());
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
