//! Kubernetes-backed stores
//!
//! Implements the core store traits on top of `K8sClient`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::{ObjectRef, Store};
use tracing::info;

use reaper_core::store::{
    ConfigData, ConfigMapStore, ObjectKey, PodInfo, PodPhase, PodStore, StoreError,
};

use super::client::K8sClient;

/// Convert a Kubernetes pod into the view the eviction reconciler works with
pub fn pod_info(key: ObjectKey, pod: &Pod) -> PodInfo {
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());

    PodInfo {
        key,
        phase: PodPhase::from_status(phase),
        creation_timestamp: pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
    }
}

/// Pod store backed by the Kubernetes API
///
/// Reads go to the watch cache when one is attached and to the API server
/// otherwise. Deletes always go to the API server.
pub struct KubePodStore {
    client: K8sClient,
    cache: Option<Store<Pod>>,
    dry_run: bool,
}

impl KubePodStore {
    /// Create a new pod store. With `dry_run` deletes are logged but not sent.
    pub fn new(client: K8sClient, dry_run: bool) -> Self {
        Self {
            client,
            cache: None,
            dry_run,
        }
    }

    /// Serve reads from a watch cache
    pub fn with_cache(mut self, cache: Store<Pod>) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl PodStore for KubePodStore {
    async fn get_pod(&self, key: &ObjectKey) -> Result<Option<PodInfo>, StoreError> {
        if let Some(cache) = &self.cache {
            let object = ObjectRef::new(&key.name).within(&key.namespace);
            return Ok(cache.get(&object).map(|pod| pod_info(key.clone(), &pod)));
        }

        let pod = self
            .client
            .get_pod(&key.namespace, &key.name)
            .await
            .map_err(|e| StoreError::Get {
                key: key.clone(),
                source: e.into(),
            })?;

        Ok(pod.map(|pod| pod_info(key.clone(), &pod)))
    }

    async fn delete_pod(&self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.dry_run {
            info!(pod = %key, "[DRY-RUN] Would delete pod");
            return Ok(());
        }

        self.client
            .delete_pod(&key.namespace, &key.name)
            .await
            .map_err(|e| StoreError::Delete {
                key: key.clone(),
                source: e.into(),
            })
    }
}

/// ConfigMap store backed by the Kubernetes API
pub struct KubeConfigMapStore {
    client: K8sClient,
}

impl KubeConfigMapStore {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigMapStore for KubeConfigMapStore {
    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigData>, StoreError> {
        let config_map = self
            .client
            .get_config_map(&key.namespace, &key.name)
            .await
            .map_err(|e| StoreError::Get {
                key: key.clone(),
                source: e.into(),
            })?;

        Ok(config_map.map(|cm| cm.data.unwrap_or_default()))
    }
}
