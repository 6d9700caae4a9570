//! Pod Reaper Core Library
//!
//! Eviction decision logic for Pod Reaper.
//! This crate provides the shared runtime configuration, the pod eviction and
//! configuration sync reconcilers, and the store abstraction they run against.

pub mod config_sync;
pub mod error;
pub mod eviction;
pub mod metrics;
pub mod shared_config;
pub mod store;

// Re-export common types
pub use config_sync::{
    is_config_target, parse_max_pod_age, ConfigError, ConfigSyncReconciler, MAX_POD_AGE_KEY,
};
pub use error::ReconcileError;
pub use eviction::{
    decide, evaluate, is_eligible_phase, is_protected_namespace, requeue_interval,
    EvictionDecision, PodEvictionReconciler, SkipReason,
};
pub use shared_config::SharedConfig;
pub use store::{ConfigData, ConfigMapStore, ObjectKey, PodInfo, PodPhase, PodStore, StoreError};
