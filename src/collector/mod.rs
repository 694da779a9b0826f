//! Probe scheduling.
//!
//! The [`Collector`] runs one interval loop per registered key and services
//! on-demand refreshes for cache reads past hard expiry.

mod job;
mod scheduler;

pub use job::*;
pub use scheduler::*;
