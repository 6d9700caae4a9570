//! Configuration sync
//!
//! Applies the `maxPodAge` entry of one designated configuration object to the
//! shared config. Invalid entries are logged and ignored: the previous value
//! stays in effect until the object is edited, which triggers a new
//! reconciliation on its own.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::ReconcileError;
use crate::metrics::MetricsRegistry;
use crate::shared_config::SharedConfig;
use crate::store::{ConfigData, ConfigMapStore, ObjectKey};

/// Data key holding the maximum pod age
pub const MAX_POD_AGE_KEY: &str = "maxPodAge";

const CONTROLLER: &str = "config";

/// Input errors in the configuration object
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The data section has no `maxPodAge` entry
    #[error("missing maxPodAge property in ConfigMap")]
    Missing,

    /// The entry is negative
    #[error("invalid maxPodAge property in ConfigMap: {0:?} is negative")]
    Negative(String),

    /// The entry is not a duration
    #[error("invalid maxPodAge property in ConfigMap: {value:?}")]
    Invalid {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
}

impl ConfigError {
    /// Short label used for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            ConfigError::Missing => "missing",
            ConfigError::Negative(_) => "negative",
            ConfigError::Invalid { .. } => "invalid",
        }
    }
}

/// Whether `key` is the configuration object this process follows
pub fn is_config_target(key: &ObjectKey, target: &ObjectKey) -> bool {
    key == target
}

/// Extract and parse the maximum pod age from a configuration object.
///
/// Accepts `<number><unit>` terms with or without separating whitespace,
/// e.g. `"1h"`, `"90s"`, `"1h30m"` or `"2h 15m"`.
pub fn parse_max_pod_age(data: &ConfigData) -> Result<Duration, ConfigError> {
    let raw = data.get(MAX_POD_AGE_KEY).ok_or(ConfigError::Missing)?;
    let value = raw.trim();

    if value.starts_with('-') {
        return Err(ConfigError::Negative(raw.clone()));
    }

    humantime::parse_duration(&separate_terms(value)).map_err(|source| ConfigError::Invalid {
        value: raw.clone(),
        source,
    })
}

// "1h30m" -> "1h 30m"
fn separate_terms(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut prev_alpha = false;
    for c in value.chars() {
        if c.is_ascii_digit() && prev_alpha {
            out.push(' ');
        }
        prev_alpha = c.is_alphabetic();
        out.push(c);
    }
    out
}

/// Reconciler syncing the configuration object into the shared config
pub struct ConfigSyncReconciler<S: ConfigMapStore> {
    store: Arc<S>,
    config: Arc<SharedConfig>,
    metrics: Arc<MetricsRegistry>,
    target: ObjectKey,
}

impl<S: ConfigMapStore> ConfigSyncReconciler<S> {
    /// Create a reconciler following the configuration object at `target`
    pub fn new(
        store: Arc<S>,
        config: Arc<SharedConfig>,
        metrics: Arc<MetricsRegistry>,
        target: ObjectKey,
    ) -> Self {
        Self {
            store,
            config,
            metrics,
            target,
        }
    }

    pub fn target(&self) -> &ObjectKey {
        &self.target
    }

    /// Reconcile the configuration object. Never requests a requeue.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<Duration>, ReconcileError> {
        let result = self.reconcile_inner(key).await;

        let outcome = match &result {
            Ok(()) => "done",
            Err(e) => e.metric_label(),
        };
        self.metrics.inc_reconciliation(CONTROLLER, outcome);

        result.map(|()| None)
    }

    async fn reconcile_inner(&self, key: &ObjectKey) -> Result<(), ReconcileError> {
        if !is_config_target(key, &self.target) {
            debug!(config_map = %key, target = %self.target, "Ignoring foreign ConfigMap");
            return Ok(());
        }

        let Some(data) = self.store.get_config_map(key).await? else {
            debug!(config_map = %key, "ConfigMap not found, keeping current configuration");
            return Ok(());
        };

        // Input errors are not retried: fixing the ConfigMap triggers a new reconciliation
        let max_pod_age = match parse_max_pod_age(&data) {
            Ok(max_pod_age) => max_pod_age,
            Err(e) => {
                self.metrics.inc_config_rejected(e.metric_label());
                error!(config_map = %key, error = %e, "Configuration will not be updated");
                return Ok(());
            }
        };

        let current_max_pod_age = self.config.max_pod_age();
        self.config.set_max_pod_age(max_pod_age);
        self.metrics.set_max_pod_age(max_pod_age.as_secs_f64());

        info!(
            config_map = %key,
            new_max_pod_age = %humantime::format_duration(max_pod_age),
            current_max_pod_age = %humantime::format_duration(current_max_pod_age),
            "Configuration updated"
        );

        Ok(())
    }
}
