//! Store interface traits and common types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Namespace + name of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Error returned when a `namespace/name` string cannot be split
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object key {0:?}, expected <namespace>/<name>")]
pub struct InvalidObjectKey(pub String);

impl FromStr for ObjectKey {
    type Err = InvalidObjectKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(InvalidObjectKey(s.to_string())),
        }
    }
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the phase reported in a pod status. Missing or unrecognised
    /// values map to `Unknown`.
    pub fn from_status(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a pod the eviction reconciler looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub key: ObjectKey,
    pub phase: PodPhase,
    /// `None` when the object carries no creation timestamp
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// Data section of a configuration object
pub type ConfigData = BTreeMap<String, String>;

/// Errors that can occur while talking to the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Fetching an object failed
    #[error("failed to get {key}: {source}")]
    Get {
        key: ObjectKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Sending a delete request failed
    #[error("failed to delete {key}: {source}")]
    Delete {
        key: ObjectKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Read and delete access to pods
///
/// A missing pod is `Ok(None)` on get and `Ok(())` on delete; only failures to
/// send the request are errors.
#[async_trait]
pub trait PodStore: Send + Sync {
    /// Fetch the current state of a pod
    async fn get_pod(&self, key: &ObjectKey) -> Result<Option<PodInfo>, StoreError>;

    /// Request deletion of a pod. Success does not mean the pod is gone yet.
    async fn delete_pod(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// Read access to configuration objects
#[async_trait]
pub trait ConfigMapStore: Send + Sync {
    /// Fetch the data section of a configuration object
    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigData>, StoreError>;
}
