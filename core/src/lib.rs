//! Controller access and the bulk key retrieval built on top of it.
//!
//! * [`controller`]: the [`controller::ControllerApi`] port and its HTTP adapter.
//! * [`session`]: login state shared by every controller call.
//! * [`retrieval`]: the bulk orchestrator producing a [`snmpkey_common::models::report::BulkReport`].
//! * [`property_sets`]: write-back of retrieved keys.

pub mod controller;
pub mod property_sets;
pub mod retrieval;
pub mod session;
