//! Controller wiring
//!
//! Runs the pod eviction and configuration sync reconcilers under
//! `kube::runtime::Controller`, which delivers one invocation per object
//! change or elapsed requeue and serializes invocations for the same object.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use reaper_core::metrics::MetricsRegistry;
use reaper_core::store::{ConfigMapStore, ObjectKey, PodStore};
use reaper_core::{ConfigSyncReconciler, PodEvictionReconciler, ReconcileError, SharedConfig};

use super::client::K8sClient;
use super::store::{KubeConfigMapStore, KubePodStore};

/// Shared state of the pod controller
pub struct PodContext<S: PodStore> {
    pub reconciler: PodEvictionReconciler<S>,
    /// Fixed delay before an object whose reconciliation failed is retried
    pub error_requeue: Duration,
}

/// Shared state of the configuration controller
pub struct ConfigContext<S: ConfigMapStore> {
    pub reconciler: ConfigSyncReconciler<S>,
    pub error_requeue: Duration,
}

/// Pod controller settings
#[derive(Debug, Clone)]
pub struct PodControllerSettings {
    pub protected_namespace: String,
    /// Log deletes instead of sending them
    pub dry_run: bool,
    pub delete_failure_requeue: Option<Duration>,
    pub error_requeue: Duration,
}

impl PodControllerSettings {
    /// Build the eviction reconciler over `store`
    pub fn reconciler<S: PodStore>(
        &self,
        store: Arc<S>,
        config: Arc<SharedConfig>,
        metrics: Arc<MetricsRegistry>,
    ) -> PodEvictionReconciler<S> {
        let reconciler = PodEvictionReconciler::new(
            store,
            config,
            metrics,
            self.protected_namespace.clone(),
        );
        match self.delete_failure_requeue {
            Some(delay) => reconciler.with_delete_failure_requeue(delay),
            None => reconciler,
        }
    }
}

/// Namespace + name of a watched object
pub fn object_key<K: Resource>(obj: &K) -> Result<ObjectKey, ReconcileError> {
    let meta = obj.meta();
    let namespace = meta
        .namespace
        .clone()
        .ok_or(ReconcileError::MissingObjectKey(".metadata.namespace"))?;
    let name = meta
        .name
        .clone()
        .ok_or(ReconcileError::MissingObjectKey(".metadata.name"))?;

    Ok(ObjectKey::new(namespace, name))
}

/// Map a reconciler outcome onto a controller action
pub fn requeue_action(requeue_after: Option<Duration>) -> Action {
    match requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Field selector keeping the protected namespace out of the pod watch
pub fn excluded_namespace_selector(protected_namespace: &str) -> String {
    format!("metadata.namespace!={}", protected_namespace)
}

/// Field selector narrowing the ConfigMap watch to a single object
pub fn config_map_selector(name: &str) -> String {
    format!("metadata.name={}", name)
}

async fn reconcile_pod<S: PodStore>(
    pod: Arc<Pod>,
    ctx: Arc<PodContext<S>>,
) -> Result<Action, ReconcileError> {
    let key = object_key(pod.as_ref())?;
    ctx.reconciler.reconcile(&key).await.map(requeue_action)
}

fn error_policy_pod<S: PodStore>(
    pod: Arc<Pod>,
    err: &ReconcileError,
    ctx: Arc<PodContext<S>>,
) -> Action {
    warn!(
        pod = %pod.name_any(),
        namespace = pod.namespace().as_deref().unwrap_or_default(),
        error = %err,
        retry_after = ?ctx.error_requeue,
        "Pod reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}

async fn reconcile_config_map<S: ConfigMapStore>(
    config_map: Arc<ConfigMap>,
    ctx: Arc<ConfigContext<S>>,
) -> Result<Action, ReconcileError> {
    let key = object_key(config_map.as_ref())?;
    ctx.reconciler.reconcile(&key).await.map(requeue_action)
}

fn error_policy_config_map<S: ConfigMapStore>(
    config_map: Arc<ConfigMap>,
    err: &ReconcileError,
    ctx: Arc<ConfigContext<S>>,
) -> Action {
    warn!(
        config_map = %config_map.name_any(),
        error = %err,
        retry_after = ?ctx.error_requeue,
        "ConfigMap reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}

type ControllerResult<K> =
    Result<(ObjectRef<K>, Action), controller::Error<ReconcileError, watcher::Error>>;

fn log_result<K: Resource>(result: ControllerResult<K>) {
    match result {
        Ok((object, action)) => debug!(object = %object, action = ?action, "Reconciled"),
        // Already reported by the error policy
        Err(controller::Error::ReconcilerFailed(..)) => {}
        Err(e) => warn!(error = %e, "Controller error"),
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Run the pod controller until shutdown is signalled
///
/// Pod reads are served from the controller's own watch cache.
pub async fn run_pod_controller(
    client: K8sClient,
    settings: PodControllerSettings,
    config: Arc<SharedConfig>,
    metrics: Arc<MetricsRegistry>,
    shutdown: watch::Receiver<bool>,
) {
    let selector = excluded_namespace_selector(&settings.protected_namespace);
    info!(field_selector = %selector, dry_run = settings.dry_run, "Starting pod controller");

    let controller = Controller::new(
        client.pods_all(),
        watcher::Config::default().fields(&selector),
    );
    let store = KubePodStore::new(client, settings.dry_run).with_cache(controller.store());
    let store = Arc::new(store);
    let ctx = Arc::new(PodContext {
        reconciler: settings.reconciler(store, config, metrics),
        error_requeue: settings.error_requeue,
    });

    let controller = controller
        .run(
            reconcile_pod::<KubePodStore>,
            error_policy_pod::<KubePodStore>,
            ctx,
        )
        .for_each(|result| async move { log_result(result) });

    tokio::select! {
        _ = controller => warn!("Pod controller stream ended"),
        _ = wait_for_shutdown(shutdown) => {
            info!("Shutdown signal received, stopping pod controller")
        }
    }
}

/// Run the configuration controller until shutdown is signalled
pub async fn run_config_controller(
    client: K8sClient,
    ctx: Arc<ConfigContext<KubeConfigMapStore>>,
    shutdown: watch::Receiver<bool>,
) {
    let target = ctx.reconciler.target().clone();
    let selector = config_map_selector(&target.name);
    info!(config_map = %target, "Starting configuration controller");

    let controller = Controller::new(
        client.config_maps(&target.namespace),
        watcher::Config::default().fields(&selector),
    )
    .run(
        reconcile_config_map::<KubeConfigMapStore>,
        error_policy_config_map::<KubeConfigMapStore>,
        ctx,
    )
    .for_each(|result| async move { log_result(result) });

    tokio::select! {
        _ = controller => warn!("Configuration controller stream ended"),
        _ = wait_for_shutdown(shutdown) => {
            info!("Shutdown signal received, stopping configuration controller")
        }
    }
}

/// Outcome counts of a single sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Pods handed to the eviction reconciler
    pub examined: usize,
    /// Pods still too young
    pub waiting: usize,
    /// Pods that failed to reconcile
    pub failed: usize,
}

/// Apply the configuration once, then reconcile every listed pod once
pub async fn sweep_once(
    client: &K8sClient,
    pods: &PodEvictionReconciler<KubePodStore>,
    config: &ConfigSyncReconciler<KubeConfigMapStore>,
) -> Result<SweepSummary> {
    let selector = excluded_namespace_selector(pods.protected_namespace());
    let keys = client
        .list_pods(&selector)
        .await?
        .iter()
        .filter_map(|pod| object_key(pod).ok())
        .collect::<Vec<_>>();

    Ok(sweep_keys(&keys, pods, config).await)
}

/// Sweep over an explicit set of pod keys
pub async fn sweep_keys<P: PodStore, C: ConfigMapStore>(
    keys: &[ObjectKey],
    pods: &PodEvictionReconciler<P>,
    config: &ConfigSyncReconciler<C>,
) -> SweepSummary {
    if let Err(e) = config.reconcile(config.target()).await {
        warn!(error = %e, "Failed to apply configuration, using current value");
    }

    let mut summary = SweepSummary::default();
    for key in keys {
        summary.examined += 1;
        match pods.reconcile(key).await {
            Ok(Some(_)) => summary.waiting += 1,
            Ok(None) => {}
            Err(e) => {
                summary.failed += 1;
                warn!(pod = %key, error = %e, "Pod reconciliation failed");
            }
        }
    }

    info!(
        examined = summary.examined,
        waiting = summary.waiting,
        failed = summary.failed,
        "Sweep complete"
    );
    summary
}
