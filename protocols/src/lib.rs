//! Parsing of vendor encrypted SNMP key material.
//!
//! * [`junos9`]: the Junos `$9$` codec.
//! * [`format`]: the data driven table describing where keys appear in device output.
//! * [`decoder`]: applies the table to single lines.

pub mod decoder;
pub mod format;
pub mod junos9;

pub use decoder::{DecodeError, KeyDecoder};
pub use format::{Cipher, FormatTable};
