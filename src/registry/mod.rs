//! Push consumer connections.

mod subscriber_registry;

pub use subscriber_registry::*;
