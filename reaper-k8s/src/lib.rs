//! Pod Reaper Kubernetes Integration
//!
//! Provides the Kubernetes client, the store implementations and the
//! controller wiring for Pod Reaper.

pub mod client;
pub mod controller;
pub mod store;

pub use client::K8sClient;
pub use controller::{
    run_config_controller, run_pod_controller, sweep_once, ConfigContext, PodContext,
    PodControllerSettings, SweepSummary,
};
pub use store::{KubeConfigMapStore, KubePodStore};
