//! Last-known-value store.
//!
//! [`TtlCache`] is the only place probe results land. Readers get O(1),
//! non-blocking point reads; a read only waits on a probe when the entry is
//! past its hard expiry or was never fetched.

mod entry;
mod ttl_cache;

pub use entry::*;
pub use ttl_cache::*;
