//! Validation scenarios of a FIWARE platform
//!
//! A [Scenario] goes through the states
//! `Clean → Provisioned → (Stimulated → Verified)* → TornDown`:
//!
//! - the tenant is cleared with [clear_all],
//! - the service groups, devices, entities and subscriptions of its setup are provisioned,
//! - each step applies a [Stimulus] then checks its [Expectation]s,
//!   polling the platform till a deadline counted from the acknowledgement of the stimulus,
//! - the tenant is cleared again, whatever the outcome.
//!
//! The [Orchestrator] drives a scenario over a [Platform],
//! whose components are reached through the traits of `fiware_api` and `mqtt_channel`
//! and can then be real clients or in-memory simulators.

mod assertions;
pub mod catalog;
mod cleanup;
mod error;
mod expectation;
mod orchestrator;
mod platform;
mod provision;
mod scenario;
mod stimulus;
mod topics;
mod verify;


pub use assertions::*;
pub use cleanup::*;
pub use error::*;
pub use expectation::*;
pub use orchestrator::*;
pub use platform::*;
pub use provision::*;
pub use scenario::*;
pub use stimulus::*;
pub use topics::*;
pub use verify::*;
