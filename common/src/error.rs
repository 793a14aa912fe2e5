//! # Error Taxonomy
//!
//! Every failure the tool can run into falls in one of these buckets, and the bucket
//! decides how far the failure travels:
//!
//! * [`AuthError`]: no valid session can be had. Aborts the whole run.
//! * [`ControllerError`]: a listing call failed (unknown blueprint, bad payload). Aborts the run.
//! * [`DeviceCommandError`]: scoped to one device. Recorded in its result, the run continues.
//! * [`PropertySetError`]: scoped to the write-back step. Retrieved keys are kept.
//!
//! Decoder errors live next to the decoder in `snmpkey-protocols`.
//!
//! All variants carry owned strings instead of transport errors so results stay `Clone`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("credentials rejected by controller ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("controller unreachable: {0}")]
    Unreachable(String),

    #[error("login response did not contain a token")]
    MissingToken,

    /// Another caller already tried to refresh this session and failed.
    #[error("session refresh failed: {0}")]
    RefreshFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("controller returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceCommandError {
    #[error("command timed out after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("command failed on device: {0}")]
    RemoteFailure(String),

    #[error("controller rejected command ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("device has no system id assigned")]
    MissingSystemId,

    #[error("device is not part of blueprint {0}")]
    NotInBlueprint(String),

    #[error("session lost: {0}")]
    Session(AuthError),

    #[error("cancelled before completion")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertySetError {
    #[error("property set conflict: {0}")]
    Conflict(String),

    #[error("property set rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session lost: {0}")]
    Session(AuthError),

    #[error("nothing to upload, no device succeeded")]
    Empty,
}
