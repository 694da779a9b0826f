use std::sync::Arc;
use std::time::SystemTime;

use crate::utils::time::epoch_millis;
use crate::Envelope;
use crate::ResourceKey;
use crate::Snapshot;
use crate::Topic;

/// A discrete, debounced change of one resource.
///
/// `sequence` is assigned by the hub at publish time and strictly increases
/// per topic. Payloads are shared between all subscribers of the topic.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: Topic,
    pub key: ResourceKey,
    pub payload: Arc<Snapshot>,
    pub sequence: u64,
    pub timestamp: SystemTime,
}

impl Event {
    pub fn timestamp_ms(&self) -> u64 {
        epoch_millis(self.timestamp)
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            key: self.key.clone(),
            topic: Some(self.topic.clone()),
            kind: Some(self.payload.kind()),
            data: Some(self.payload.clone()),
            sequence: self.sequence,
            stale: false,
            last_updated_ms: Some(self.timestamp_ms()),
            last_error: None,
        }
    }
}
