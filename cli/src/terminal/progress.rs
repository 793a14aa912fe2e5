use colored::*;
use indicatif::ProgressStyle;
use snmpkey_common::models::report::ExtractionResult;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::terminal::colors;

const TICK_STRINGS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICK_STRINGS)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(TICK_STRINGS)
        .progress_chars("█▓░")
}

/// Shows a spinner with `msg` for as long as `span` is alive.
pub fn start_spinner(span: &Span, msg: &str) {
    span.pb_set_style(&spinner_style());
    span.pb_set_message(msg);
}

fn counter_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {pos} device(s) done {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICK_STRINGS)
}

/// Turns `span` into a bar counting finished devices, or a plain counter when the total
/// is only known once the systems are listed.
pub fn start_device_bar(span: &Span, devices: Option<usize>) {
    match devices {
        Some(devices) => {
            span.pb_set_style(&bar_style());
            span.pb_set_length(devices as u64);
        }
        None => span.pb_set_style(&counter_style()),
    }
    span.pb_set_message("retrieving keys...");
}

pub fn report_device_done(span: &Span, res: &ExtractionResult) {
    let name = res.display_name();
    let msg = if res.is_success() {
        format!("{} done", name.color(colors::SUCCEEDED))
    } else {
        format!("{} failed", name.color(colors::FAILED))
    };
    span.pb_set_message(&msg);
    span.pb_inc(1);
}
