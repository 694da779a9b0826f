//! Telemetry collection and caching core.
//!
//! Probes sample external subsystems on a schedule, results land in a
//! TTL cache with stale-while-revalidate reads, and meaningful changes are
//! debounced and fanned out to subscribers over bounded per-subscriber
//! queues. [`CoreBuilder`] wires everything into a [`TelemetryCore`].

mod cache;
mod collector;
mod config;
mod constants;
mod detector;
mod errors;
mod hub;
mod key;
mod metrics;
mod node;
mod probe;
mod registry;
mod snapshot;
pub mod utils;

pub use cache::*;
pub use collector::*;
pub use config::*;
pub use detector::*;
pub use errors::*;
pub use hub::*;
pub use key::*;
pub use metrics::*;
pub use node::*;
pub use probe::*;
pub use registry::*;
pub use snapshot::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod key_test;
