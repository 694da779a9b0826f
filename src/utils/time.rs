use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return milliseconds since the unix epoch
pub(crate) fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// return current time in milliseconds since the unix epoch
pub(crate) fn now_millis() -> u64 {
    epoch_millis(SystemTime::now())
}
