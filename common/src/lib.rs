//! Types shared across the `snmpkey` workspace: domain models, the error taxonomy,
//! runtime configuration and the logging macros the other crates emit through.

pub mod config;
pub mod error;
pub mod log;
pub mod models;

#[doc(hidden)]
pub use tracing;
