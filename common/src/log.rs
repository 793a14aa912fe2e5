/// Tracing target the CLI formatter renders as a success line.
pub const SUCCESS_TARGET: &str = "snmpkey::success";

/// Emits an `INFO` event flagged as a successful outcome.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        $crate::tracing::info!(target: "snmpkey::success", $($arg)*)
    };
}
