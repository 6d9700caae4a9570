//! Prometheus metrics for Pod Reaper

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_gauge, register_int_counter, register_int_counter_vec, Gauge, IntCounter,
    IntCounterVec,
};

use crate::store::PodPhase;

/// Reconciliation counter by controller and outcome
static RECONCILIATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pod_reaper_reconciliations_total",
            "Total number of reconciliations"
        ),
        &["controller", "outcome"]
    )
    .expect("Failed to create reconciliations metric")
});

/// Deleted pods by phase
static PODS_DELETED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("pod_reaper_pods_deleted_total", "Total number of pods deleted"),
        &["phase"]
    )
    .expect("Failed to create pods_deleted metric")
});

/// Failed delete requests
static DELETE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "pod_reaper_delete_failures_total",
        "Total number of failed pod delete requests"
    ))
    .expect("Failed to create delete_failures metric")
});

/// Rejected configuration updates
static CONFIG_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pod_reaper_config_rejected_total",
            "Total number of rejected configuration updates"
        ),
        &["reason"]
    )
    .expect("Failed to create config_rejected metric")
});

/// Effective maximum pod age
static MAX_POD_AGE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(opts!(
        "pod_reaper_max_pod_age_seconds",
        "Currently effective maximum age of non-running pods"
    ))
    .expect("Failed to create max_pod_age metric")
});

/// Metrics registry wrapper
pub struct MetricsRegistry;

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        // Force initialization of lazy statics
        let _ = &*RECONCILIATIONS;
        let _ = &*PODS_DELETED;
        let _ = &*DELETE_FAILURES;
        let _ = &*CONFIG_REJECTED;
        let _ = &*MAX_POD_AGE;
        Self
    }

    /// Increment reconciliation counter
    pub fn inc_reconciliation(&self, controller: &str, outcome: &str) {
        RECONCILIATIONS
            .with_label_values(&[controller, outcome])
            .inc();
    }

    /// Increment deleted pod counter
    pub fn inc_pod_deleted(&self, phase: PodPhase) {
        PODS_DELETED.with_label_values(&[phase.as_str()]).inc();
    }

    pub fn inc_delete_failure(&self) {
        DELETE_FAILURES.inc();
    }

    /// Increment rejected configuration counter
    pub fn inc_config_rejected(&self, reason: &str) {
        CONFIG_REJECTED.with_label_values(&[reason]).inc();
    }

    /// Set effective maximum pod age
    pub fn set_max_pod_age(&self, seconds: f64) {
        MAX_POD_AGE.set(seconds);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn reconciliation_count(controller: &str, outcome: &str) -> u64 {
    RECONCILIATIONS
        .with_label_values(&[controller, outcome])
        .get()
}

#[cfg(test)]
pub(crate) fn config_rejected_count(reason: &str) -> u64 {
    CONFIG_REJECTED.with_label_values(&[reason]).get()
}

#[cfg(test)]
pub(crate) fn delete_failure_count() -> u64 {
    DELETE_FAILURES.get()
}
