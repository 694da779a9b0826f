use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::constants::TOPIC_SUFFIX;
use crate::Error;
use crate::Result;

/// Stable identifier of a monitored entity, namespaced by subsystem
/// (`docker.container.<id>`, `storage.disk.<name>`, `ups.status`).
///
/// Immutable once built; cloning is a refcount bump.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidConfig("resource key cannot be empty".into()));
        }
        if raw.split('.').any(|segment| segment.is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "resource key `{raw}` contains an empty segment"
            )));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(Error::InvalidConfig(format!(
                "resource key `{raw}` contains whitespace"
            )));
        }
        Ok(Self(Arc::from(raw)))
    }

    /// Subsystem segment, e.g. `docker` for `docker.container.abc`.
    pub fn namespace(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Unchecked conversion for literals in wiring code. Use [`ResourceKey::parse`]
/// for external input.
impl From<&str> for ResourceKey {
    fn from(raw: &str) -> Self {
        Self(Arc::from(raw))
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ResourceKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Named publish/subscribe channel.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(Arc<str>);

impl Topic {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Events for `docker.container.abc` are routed to `docker.events`.
    pub fn for_key(key: &ResourceKey) -> Self {
        Self(Arc::from(format!("{}{}", key.namespace(), TOPIC_SUFFIX)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Topic::new(name)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Topic(Arc::from(name))
    }
}

impl fmt::Display for Topic {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Topic {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}
