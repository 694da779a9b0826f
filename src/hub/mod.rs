//! Topic publish/subscribe.
//!
//! The topic index is read on every publish and written only on subscribe and
//! unsubscribe, so it is kept copy-on-write. Each subscriber owns a bounded
//! [`SubscriberQueue`]; a slow consumer fills its own buffer and nothing else.

mod event;
mod event_hub;
mod queue;
mod state;
mod subscription;

pub use event::*;
pub use event_hub::*;
pub(crate) use queue::*;
pub use state::SubscriptionState;
pub(crate) use state::StateCell;
pub use subscription::*;


pub type SubscriptionId = u64;
