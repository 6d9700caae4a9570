//! Configuration module for Pod Reaper
//!
//! Handles loading and validating the daemon configuration from YAML files.
//! The maximum pod age itself is tuned at runtime through the watched
//! ConfigMap; `default_max_pod_age` only seeds it until that is applied.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use reaper_core::store::ObjectKey;

/// Location of the ConfigMap holding `maxPodAge`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMapRef {
    /// Namespace of the ConfigMap
    #[serde(default = "default_config_map_namespace")]
    pub namespace: String,

    /// Name of the ConfigMap
    #[serde(default = "default_config_map_name")]
    pub name: String,
}

impl ConfigMapRef {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

impl Default for ConfigMapRef {
    fn default() -> Self {
        Self {
            namespace: default_config_map_namespace(),
            name: default_config_map_name(),
        }
    }
}

/// Metrics export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port to expose metrics on
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace whose pods are never deleted
    #[serde(default = "default_protected_namespace")]
    pub protected_namespace: String,

    /// ConfigMap holding the runtime-tunable maximum pod age
    #[serde(default)]
    pub config_map: ConfigMapRef,

    /// Maximum pod age until the ConfigMap has been applied
    #[serde(with = "humantime_serde", default = "default_max_pod_age")]
    pub default_max_pod_age: Duration,

    /// Delay before retrying a failed reconciliation
    #[serde(with = "humantime_serde", default = "default_error_requeue")]
    pub error_requeue: Duration,

    /// Requeue a pod after this delay when its delete request fails,
    /// instead of reporting the failure as a reconciliation error
    #[serde(with = "humantime_serde", default)]
    pub delete_failure_requeue: Option<Duration>,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Dry run mode - log deletions but don't execute
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protected_namespace: default_protected_namespace(),
            config_map: ConfigMapRef::default(),
            default_max_pod_age: default_max_pod_age(),
            error_requeue: default_error_requeue(),
            delete_failure_requeue: None,
            metrics: MetricsConfig::default(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.protected_namespace.is_empty() {
            anyhow::bail!("protected_namespace must not be empty");
        }
        if self.config_map.namespace.is_empty() || self.config_map.name.is_empty() {
            anyhow::bail!("config_map.namespace and config_map.name must not be empty");
        }
        if self.config_map.namespace.contains('/') || self.config_map.name.contains('/') {
            anyhow::bail!("config_map.namespace and config_map.name must not contain '/'");
        }
        if self.error_requeue.is_zero() {
            anyhow::bail!("error_requeue must be > 0");
        }
        if self.delete_failure_requeue.is_some_and(|d| d.is_zero()) {
            anyhow::bail!("delete_failure_requeue must be > 0 when set");
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            anyhow::bail!("metrics.port must be > 0 when metrics are enabled");
        }
        Ok(())
    }

    /// Override the ConfigMap location from a `namespace/name` string
    pub fn with_config_map(mut self, full_name: &str) -> Result<Self> {
        let key: ObjectKey = full_name.parse()?;
        self.config_map = ConfigMapRef {
            namespace: key.namespace,
            name: key.name,
        };
        Ok(self)
    }
}

// Default value functions
fn default_protected_namespace() -> String {
    "kube-system".to_string()
}

fn default_config_map_namespace() -> String {
    "pod-reaper-system".to_string()
}

fn default_config_map_name() -> String {
    "pod-reaper-config".to_string()
}

fn default_max_pod_age() -> Duration {
    reaper_core::shared_config::DEFAULT_MAX_POD_AGE
}

fn default_error_requeue() -> Duration {
    Duration::from_secs(30)
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_true() -> bool {
    true
}
