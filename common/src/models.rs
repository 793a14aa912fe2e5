//! # Domain Models
//!
//! Data shared by the decoder, the controller adapter, the orchestrator and the CLI.
//!
//! ## Controller Entities
//! * [`blueprint::Blueprint`]: A fabric blueprint, the unit devices are grouped in.
//! * [`device::Device`]: A switch system inside a blueprint.
//! * [`property_set::PropertySet`]: A named key-value mapping stored on the controller.
//!
//! ## Results
//! * [`key::DecodedKey`]: One decoded authentication or privacy key.
//! * [`report::ExtractionResult`]: The finalized outcome for a single device.
//! * [`report::BulkReport`]: All outcomes of a run, in request order.

pub mod blueprint;
pub mod device;
pub mod key;
pub mod property_set;
pub mod report;
