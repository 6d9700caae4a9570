//! In-memory store implementation for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ConfigData, ConfigMapStore, ObjectKey, PodInfo, PodPhase, PodStore, StoreError};

/// In-memory pod and configuration store
#[derive(Default)]
pub struct MockStore {
    pods: Mutex<HashMap<ObjectKey, PodInfo>>,
    config_maps: Mutex<HashMap<ObjectKey, ConfigData>>,
    delete_calls: Mutex<Vec<ObjectKey>>,
    /// Configurable delete failure simulation
    pub fail_delete: AtomicBool,
    /// Configurable get failure simulation
    pub fail_get: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pod
    pub fn add_pod(
        &self,
        key: ObjectKey,
        phase: PodPhase,
        creation_timestamp: Option<DateTime<Utc>>,
    ) {
        let pod = PodInfo {
            key: key.clone(),
            phase,
            creation_timestamp,
        };
        lock(&self.pods).insert(key, pod);
    }

    /// Insert or replace a configuration object
    pub fn put_config_map(&self, key: ObjectKey, data: ConfigData) {
        lock(&self.config_maps).insert(key, data);
    }

    /// Remove a configuration object
    pub fn remove_config_map(&self, key: &ObjectKey) {
        lock(&self.config_maps).remove(key);
    }

    pub fn contains_pod(&self, key: &ObjectKey) -> bool {
        lock(&self.pods).contains_key(key)
    }

    /// Keys passed to `delete_pod`, in call order, including failed calls
    pub fn delete_calls(&self) -> Vec<ObjectKey> {
        lock(&self.delete_calls).clone()
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    fn check_get(&self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StoreError::Get {
                key: key.clone(),
                source: "simulated get failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PodStore for MockStore {
    async fn get_pod(&self, key: &ObjectKey) -> Result<Option<PodInfo>, StoreError> {
        self.check_get(key)?;
        Ok(lock(&self.pods).get(key).cloned())
    }

    async fn delete_pod(&self, key: &ObjectKey) -> Result<(), StoreError> {
        lock(&self.delete_calls).push(key.clone());

        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Delete {
                key: key.clone(),
                source: "simulated delete failure".into(),
            });
        }

        lock(&self.pods).remove(key);
        Ok(())
    }
}

#[async_trait]
impl ConfigMapStore for MockStore {
    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigData>, StoreError> {
        self.check_get(key)?;
        Ok(lock(&self.config_maps).get(key).cloned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
