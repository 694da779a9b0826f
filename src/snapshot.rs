//! Typed probe payloads.
//!
//! Each monitored domain has its own snapshot struct; [`Snapshot`] is the
//! tagged union the cache and hub carry around without knowing the domain.
//! [`Envelope`] is the `{key, kind, data}` wrapper handed to transports.
//!
//! Change detection works on [`Snapshot::fingerprint`], which hashes only the
//! fields that carry meaning. Collection timestamps and other counters that
//! move on every poll are left out so an unchanged resource never produces an
//! event.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::VOLATILE_RAW_FIELDS;
use crate::ProbeFailure;
use crate::ResourceKey;
use crate::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Container,
    VirtualMachine,
    Disk,
    Array,
    Sensor,
    Ups,
    Raw,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Container => "container",
            ResourceKind::VirtualMachine => "virtual_machine",
            ResourceKind::Disk => "disk",
            ResourceKind::Array => "array",
            ResourceKind::Sensor => "sensor",
            ResourceKind::Ups => "ups",
            ResourceKind::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub id: String,
    pub name: String,
    pub image: String,
    /// running, exited, paused, ...
    pub state: String,
    #[serde(default)]
    pub health: Option<String>,
    #[serde(default)]
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSnapshot {
    pub name: String,
    pub state: String,
    pub vcpus: u32,
    pub memory_kib: u64,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub name: String,
    pub device: String,
    /// Spun-down disks report no temperature.
    #[serde(default)]
    pub temperature_c: Option<i32>,
    pub smart_passed: bool,
    #[serde(default)]
    pub spun_down: bool,
    pub size_bytes: u64,
    #[serde(default)]
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySnapshot {
    pub state: String,
    pub disks_total: u32,
    pub disks_missing: u32,
    #[serde(default)]
    pub sync_progress_pct: Option<u8>,
    #[serde(default)]
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub chip: String,
    /// label -> reading (°C, RPM, V)
    pub readings: BTreeMap<String, f64>,
    #[serde(default)]
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsSnapshot {
    /// ONLINE, ONBATT, LOWBATT, ...
    pub status: String,
    pub on_battery: bool,
    pub battery_charge_pct: f64,
    pub load_pct: f64,
    /// Estimate recomputed on every poll; not part of the fingerprint.
    #[serde(default)]
    pub time_left_secs: u64,
    #[serde(default)]
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Container(ContainerSnapshot),
    VirtualMachine(VmSnapshot),
    Disk(DiskSnapshot),
    Array(ArraySnapshot),
    Sensor(SensorSnapshot),
    Ups(UpsSnapshot),
    Raw(serde_json::Value),
}

impl Snapshot {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Snapshot::Container(_) => ResourceKind::Container,
            Snapshot::VirtualMachine(_) => ResourceKind::VirtualMachine,
            Snapshot::Disk(_) => ResourceKind::Disk,
            Snapshot::Array(_) => ResourceKind::Array,
            Snapshot::Sensor(_) => ResourceKind::Sensor,
            Snapshot::Ups(_) => ResourceKind::Ups,
            Snapshot::Raw(_) => ResourceKind::Raw,
        }
    }

    /// Hash over the semantically relevant fields only.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.kind().hash(&mut h);
        match self {
            Snapshot::Container(c) => {
                c.id.hash(&mut h);
                c.name.hash(&mut h);
                c.image.hash(&mut h);
                c.state.hash(&mut h);
                c.health.hash(&mut h);
            }
            Snapshot::VirtualMachine(vm) => {
                vm.name.hash(&mut h);
                vm.state.hash(&mut h);
                vm.vcpus.hash(&mut h);
                vm.memory_kib.hash(&mut h);
                vm.autostart.hash(&mut h);
            }
            Snapshot::Disk(d) => {
                d.name.hash(&mut h);
                d.device.hash(&mut h);
                d.temperature_c.hash(&mut h);
                d.smart_passed.hash(&mut h);
                d.spun_down.hash(&mut h);
                d.size_bytes.hash(&mut h);
            }
            Snapshot::Array(a) => {
                a.state.hash(&mut h);
                a.disks_total.hash(&mut h);
                a.disks_missing.hash(&mut h);
                a.sync_progress_pct.hash(&mut h);
            }
            Snapshot::Sensor(s) => {
                s.chip.hash(&mut h);
                for (label, value) in &s.readings {
                    label.hash(&mut h);
                    quantize(*value).hash(&mut h);
                }
            }
            Snapshot::Ups(u) => {
                u.status.hash(&mut h);
                u.on_battery.hash(&mut h);
                quantize(u.battery_charge_pct).hash(&mut h);
                quantize(u.load_pct).hash(&mut h);
            }
            Snapshot::Raw(value) => {
                if let serde_json::Value::Object(map) = value {
                    for (field, v) in map {
                        if VOLATILE_RAW_FIELDS.contains(&field.as_str()) {
                            continue;
                        }
                        field.hash(&mut h);
                        hash_json(v, &mut h);
                    }
                } else {
                    hash_json(value, &mut h);
                }
            }
        }
        h.finish()
    }

    /// Decodes a probe document.
    ///
    /// `{"kind": "<kind>", "data": {...}}` documents become the matching typed
    /// variant; anything else is kept as [`Snapshot::Raw`].
    pub fn decode(value: serde_json::Value) -> serde_json::Result<Snapshot> {
        let kind = value
            .get("kind")
            .cloned()
            .and_then(|k| serde_json::from_value::<ResourceKind>(k).ok());
        let (kind, data) = match (kind, value.get("data")) {
            (Some(kind), Some(data)) => (kind, data.clone()),
            _ => return Ok(Snapshot::Raw(value)),
        };
        Ok(match kind {
            ResourceKind::Container => Snapshot::Container(serde_json::from_value(data)?),
            ResourceKind::VirtualMachine => Snapshot::VirtualMachine(serde_json::from_value(data)?),
            ResourceKind::Disk => Snapshot::Disk(serde_json::from_value(data)?),
            ResourceKind::Array => Snapshot::Array(serde_json::from_value(data)?),
            ResourceKind::Sensor => Snapshot::Sensor(serde_json::from_value(data)?),
            ResourceKind::Ups => Snapshot::Ups(serde_json::from_value(data)?),
            ResourceKind::Raw => Snapshot::Raw(data),
        })
    }

    pub fn is_equivalent(
        &self,
        other: &Snapshot,
    ) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

/// Readings are compared at 0.1 resolution so sensor noise below that does
/// not register as a change.
fn quantize(value: f64) -> i64 {
    (value * 10.0).round() as i64
}

fn hash_json<H: Hasher>(
    value: &serde_json::Value,
    h: &mut H,
) {
    use serde_json::Value;

    std::mem::discriminant(value).hash(h);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(h),
        Value::Number(n) => n.to_string().hash(h),
        Value::String(s) => s.hash(h),
        Value::Array(items) => {
            items.len().hash(h);
            for item in items {
                hash_json(item, h);
            }
        }
        Value::Object(map) => {
            // serde_json's default map is ordered, so iteration is stable
            map.len().hash(h);
            for (k, v) in map {
                k.hash(h);
                hash_json(v, h);
            }
        }
    }
}

/// Transport-facing `{key, kind, data}` wrapper.
///
/// Read APIs expose `stale`, `last_updated_ms` and `last_error` next to the
/// data instead of failing when one subsystem is degraded.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub key: ResourceKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    pub kind: Option<ResourceKind>,
    pub data: Option<Arc<Snapshot>>,
    pub sequence: u64,
    pub stale: bool,
    pub last_updated_ms: Option<u64>,
    pub last_error: Option<ProbeFailure>,
}
