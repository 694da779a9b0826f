//! Change detection.
//!
//! Compares every successful cache write against the previous payload by
//! fingerprint and forwards meaningful, debounced changes to the event hub.

mod change_detector;

pub use change_detector::*;
