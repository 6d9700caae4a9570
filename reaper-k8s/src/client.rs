//! Kubernetes Client wrapper
//!
//! Provides a simplified interface to the Kubernetes API.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, DeleteParams, ListParams};
use kube::Client;
use tracing::{debug, info};

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a new K8s client using in-cluster config or the local kubeconfig
    pub async fn new() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;

        info!("Connected to Kubernetes API server");
        Ok(Self::from_client(client))
    }

    /// Wrap an already configured kube client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Get pods API for a namespace
    pub fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Get all pods API
    pub fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    /// Get ConfigMaps API for a namespace
    pub fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Get a pod, `None` if it does not exist
    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        self.pods(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get pod: {}/{}", namespace, name))
    }

    /// Get a ConfigMap, `None` if it does not exist
    pub async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.config_maps(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get ConfigMap: {}/{}", namespace, name))
    }

    /// Delete a pod. A pod that is already gone counts as deleted.
    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!(namespace = namespace, pod = name, "Pod delete request accepted");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(namespace = namespace, pod = name, "Pod already gone");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to delete pod: {}/{}", namespace, name))),
        }
    }

    /// List pods across all namespaces matching a field selector
    pub async fn list_pods(&self, field_selector: &str) -> Result<Vec<Pod>> {
        let params = ListParams::default().fields(field_selector);

        let pods = self
            .pods_all()
            .list(&params)
            .await
            .with_context(|| format!("Failed to list pods matching: {}", field_selector))?;

        Ok(pods.items)
    }

    /// Check if the API server is reachable and pods can be listed
    pub async fn health_check(&self) -> Result<()> {
        let _ = self
            .pods_all()
            .list(&ListParams::default().limit(1))
            .await
            .context("Failed to list pods")?;
        Ok(())
    }
}

