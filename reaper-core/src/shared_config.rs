//! Shared runtime configuration
//!
//! Holds the maximum non-running pod age. Written by the configuration sync
//! reconciler and read by the pod eviction reconciler; both serialize on a
//! single mutex that is held only for one read or one write.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Maximum pod age used until a configuration object has been applied
pub const DEFAULT_MAX_POD_AGE: Duration = Duration::from_secs(60 * 60);

/// Thread-safe holder of the eviction threshold
///
/// Share it between reconcilers behind an `Arc`.
#[derive(Debug)]
pub struct SharedConfig {
    max_pod_age: Mutex<Duration>,
}

impl SharedConfig {
    /// Create a shared config holding `max_pod_age`
    pub fn new(max_pod_age: Duration) -> Self {
        Self {
            max_pod_age: Mutex::new(max_pod_age),
        }
    }

    /// Currently effective maximum pod age
    pub fn max_pod_age(&self) -> Duration {
        *self.lock()
    }

    /// Replace the maximum pod age. The caller validates the value.
    pub fn set_max_pod_age(&self, max_pod_age: Duration) {
        *self.lock() = max_pod_age;
    }

    // A panicking writer cannot leave a half-written Duration behind, so a
    // poisoned lock still guards a valid value.
    fn lock(&self) -> MutexGuard<'_, Duration> {
        self.max_pod_age
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POD_AGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_default_is_one_hour() {
        let config = SharedConfig::default();
        assert_eq!(config.max_pod_age(), Duration::from_secs(3600));
    }

    #[test]
    fn test_get_after_set() {
        let config = SharedConfig::default();
        for secs in [0, 1, 90, 2700, 86_400] {
            config.set_max_pod_age(Duration::from_secs(secs));
            assert_eq!(config.max_pod_age(), Duration::from_secs(secs));
        }
    }

    #[test]
    fn test_concurrent_readers_observe_set_value() {
        let config = Arc::new(SharedConfig::default());
        config.set_max_pod_age(Duration::from_secs(45 * 60));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let config = config.clone();
                thread::spawn(move || {
                    (0..1000).all(|_| config.max_pod_age() == Duration::from_secs(45 * 60))
                })
            })
            .collect();

        for reader in readers {
            assert!(reader.join().unwrap());
        }
    }

    #[test]
    fn test_concurrent_writer_never_exposes_foreign_value() {
        let config = Arc::new(SharedConfig::new(Duration::from_secs(10)));
        let writer = {
            let config = config.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    let secs = if i % 2 == 0 { 10 } else { 20 };
                    config.set_max_pod_age(Duration::from_secs(secs));
                }
                config.set_max_pod_age(Duration::from_secs(30));
            })
        };

        for _ in 0..1000 {
            let seen = config.max_pod_age().as_secs();
            assert!(seen == 10 || seen == 20 || seen == 30);
        }

        writer.join().unwrap();
        assert_eq!(config.max_pod_age(), Duration::from_secs(30));
    }

    #[test]
    fn test_poisoned_lock_still_readable() {
        let config = Arc::new(SharedConfig::new(Duration::from_secs(5)));
        let poisoner = config.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.max_pod_age.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert_eq!(config.max_pod_age(), Duration::from_secs(5));
        config.set_max_pod_age(Duration::from_secs(6));
        assert_eq!(config.max_pod_age(), Duration::from_secs(6));
    }
}
