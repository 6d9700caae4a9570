//! Pod eviction
//!
//! Decides the fate of a single pod on each invocation:
//! skip it, delete it now, or look at it again after a delay.
//!
//! Per-pod lifecycle across invocations:
//! - UNOBSERVED → WAITING: eligible pod younger than the maximum age (requeue)
//! - WAITING → WAITING: still too young, re-evaluated against the current maximum age
//! - WAITING → DELETED: maximum age reached and the delete request was sent
//! - WAITING → ERROR-RETRY: delete request failed, the controller retries
//!
//! Pods in the protected namespace or in a running phase are never tracked.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::metrics::MetricsRegistry;
use crate::shared_config::SharedConfig;
use crate::store::{ObjectKey, PodInfo, PodPhase, PodStore};

/// Upper bound for the requeue delay of a waiting pod. Bounds how long a
/// lowered maximum age takes to reach pods that are already waiting.
pub const MAX_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// Added to the maximum age so a tiny maximum never yields a zero delay
pub const REQUEUE_MARGIN: Duration = Duration::from_secs(1);

const CONTROLLER: &str = "pod";

/// Why a pod was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Pod lives in the protected namespace
    ProtectedNamespace,
    /// Pod no longer exists
    NotFound,
    /// Pod is in a phase that is never evicted
    IneligiblePhase(PodPhase),
}

/// Outcome of evaluating a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionDecision {
    Skip(SkipReason),
    DeleteNow,
    RequeueAfter(Duration),
}

/// Whether `namespace` is exempt from eviction
pub fn is_protected_namespace(namespace: &str, protected_namespace: &str) -> bool {
    namespace == protected_namespace
}

/// Whether a pod in `phase` may be evicted once old enough
pub fn is_eligible_phase(phase: PodPhase) -> bool {
    matches!(
        phase,
        PodPhase::Pending | PodPhase::Succeeded | PodPhase::Failed
    )
}

/// Delay before a waiting pod is looked at again
pub fn requeue_interval(max_pod_age: Duration) -> Duration {
    MAX_REQUEUE_INTERVAL.min(max_pod_age.saturating_add(REQUEUE_MARGIN))
}

/// Age of a pod at `now`. A creation timestamp in the future counts as zero.
pub fn pod_age(creation_timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(creation_timestamp)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Decide what to do with a pod of the given phase and age
pub fn decide(phase: PodPhase, age: Duration, max_pod_age: Duration) -> EvictionDecision {
    if !is_eligible_phase(phase) {
        return EvictionDecision::Skip(SkipReason::IneligiblePhase(phase));
    }

    if age < max_pod_age {
        // Waiting the exact remaining time would ignore config updates until
        // then, so poll at most once a minute instead.
        return EvictionDecision::RequeueAfter(requeue_interval(max_pod_age));
    }

    EvictionDecision::DeleteNow
}

/// Evaluate a fetched pod at `now` against `max_pod_age`
pub fn evaluate(
    pod: &PodInfo,
    now: DateTime<Utc>,
    max_pod_age: Duration,
) -> Result<EvictionDecision, ReconcileError> {
    if !is_eligible_phase(pod.phase) {
        return Ok(EvictionDecision::Skip(SkipReason::IneligiblePhase(pod.phase)));
    }

    let created = pod
        .creation_timestamp
        .ok_or_else(|| ReconcileError::MissingCreationTimestamp(pod.key.clone()))?;

    Ok(decide(pod.phase, pod_age(created, now), max_pod_age))
}

/// Reconciler deleting pods that stayed too long in a non-running phase
pub struct PodEvictionReconciler<S: PodStore> {
    store: Arc<S>,
    config: Arc<SharedConfig>,
    metrics: Arc<MetricsRegistry>,
    protected_namespace: String,
    /// Requeue delay after a failed delete; `None` hands the error to the controller
    delete_failure_requeue: Option<Duration>,
}

impl<S: PodStore> PodEvictionReconciler<S> {
    /// Create a new pod eviction reconciler
    pub fn new(
        store: Arc<S>,
        config: Arc<SharedConfig>,
        metrics: Arc<MetricsRegistry>,
        protected_namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            config,
            metrics,
            protected_namespace: protected_namespace.into(),
            delete_failure_requeue: None,
        }
    }

    /// Requeue after `delay` when a delete request fails instead of returning the error
    pub fn with_delete_failure_requeue(mut self, delay: Duration) -> Self {
        self.delete_failure_requeue = Some(delay);
        self
    }

    pub fn protected_namespace(&self) -> &str {
        &self.protected_namespace
    }

    /// Reconcile one pod. Returns the delay after which it should be looked at
    /// again, if any.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<Duration>, ReconcileError> {
        let result = self.reconcile_inner(key).await;

        let outcome = match &result {
            Ok(Some(_)) => "requeued",
            Ok(None) => "done",
            Err(e) => e.metric_label(),
        };
        self.metrics.inc_reconciliation(CONTROLLER, outcome);

        result
    }

    async fn reconcile_inner(&self, key: &ObjectKey) -> Result<Option<Duration>, ReconcileError> {
        if is_protected_namespace(&key.namespace, &self.protected_namespace) {
            return Ok(skip(key, SkipReason::ProtectedNamespace));
        }

        let Some(pod) = self.store.get_pod(key).await? else {
            return Ok(skip(key, SkipReason::NotFound));
        };

        let max_pod_age = self.config.max_pod_age();
        let now = Utc::now();

        match evaluate(&pod, now, max_pod_age)? {
            EvictionDecision::Skip(reason) => Ok(skip(key, reason)),
            EvictionDecision::RequeueAfter(delay) => {
                debug!(
                    pod = %key,
                    phase = %pod.phase,
                    requeue_after = ?delay,
                    "Pod has not reached its maximum age"
                );
                Ok(Some(delay))
            }
            EvictionDecision::DeleteNow => {
                let age = pod.creation_timestamp.map(|t| pod_age(t, now));
                info!(
                    pod = %key,
                    phase = %pod.phase,
                    pod_age = ?age,
                    max_pod_age = ?max_pod_age,
                    "Deleting non-running pod"
                );
                self.delete(&pod).await
            }
        }
    }

    async fn delete(&self, pod: &PodInfo) -> Result<Option<Duration>, ReconcileError> {
        if let Err(e) = self.store.delete_pod(&pod.key).await {
            self.metrics.inc_delete_failure();

            if let Some(delay) = self.delete_failure_requeue {
                warn!(
                    pod = %pod.key,
                    error = %e,
                    requeue_after = ?delay,
                    "Failed to delete pod, requeueing"
                );
                return Ok(Some(delay));
            }

            return Err(ReconcileError::DeleteFailed {
                key: pod.key.clone(),
                source: e,
            });
        }

        self.metrics.inc_pod_deleted(pod.phase);
        info!(pod = %pod.key, "Pod deleted");
        Ok(None)
    }
}

fn skip(key: &ObjectKey, reason: SkipReason) -> Option<Duration> {
    debug!(pod = %key, reason = ?reason, "Skipping pod");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{delete_failure_count, reconciliation_count};
    use crate::store::MockStore;
    use chrono::Duration as ChronoDuration;
    use tokio_test::{assert_err, assert_ok};

    const PROTECTED: &str = "kube-system";

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn reconciler(
        store: Arc<MockStore>,
        max_pod_age: Duration,
    ) -> PodEvictionReconciler<MockStore> {
        PodEvictionReconciler::new(
            store,
            Arc::new(SharedConfig::new(max_pod_age)),
            Arc::new(MetricsRegistry::new()),
            PROTECTED,
        )
    }

    fn created_ago(minutes: i64) -> Option<DateTime<Utc>> {
        Some(Utc::now() - ChronoDuration::minutes(minutes))
    }

    #[test]
    fn test_eligible_phases() {
        let cases = [
            (PodPhase::Pending, true),
            (PodPhase::Succeeded, true),
            (PodPhase::Failed, true),
            (PodPhase::Running, false),
            (PodPhase::Unknown, false),
        ];
        for (phase, expected) in cases {
            assert_eq!(is_eligible_phase(phase), expected, "phase {phase}");
        }
    }

    #[test]
    fn test_protected_namespace() {
        assert!(is_protected_namespace("kube-system", PROTECTED));
        assert!(!is_protected_namespace("default", PROTECTED));
        assert!(!is_protected_namespace("kube-system-extra", PROTECTED));
    }

    #[test]
    fn test_requeue_interval() {
        assert_eq!(requeue_interval(minutes(60)), minutes(1));
        assert_eq!(requeue_interval(Duration::from_secs(59)), minutes(1));
        assert_eq!(requeue_interval(Duration::from_secs(30)), Duration::from_secs(31));
        assert_eq!(requeue_interval(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(requeue_interval(Duration::MAX), minutes(1));
    }

    #[test]
    fn test_pod_age_future_timestamp_is_zero() {
        let now = Utc::now();
        assert_eq!(pod_age(now + ChronoDuration::minutes(5), now), Duration::ZERO);
        assert_eq!(pod_age(now - ChronoDuration::minutes(5), now), minutes(5));
    }

    #[test]
    fn test_decide_delete_when_old_enough() {
        for phase in [PodPhase::Pending, PodPhase::Succeeded, PodPhase::Failed] {
            for (age, max) in [(60, 60), (61, 60), (7200, 3600), (0, 0)] {
                assert_eq!(
                    decide(phase, Duration::from_secs(age), Duration::from_secs(max)),
                    EvictionDecision::DeleteNow,
                    "phase {phase}, age {age}s, max {max}s"
                );
            }
        }
    }

    #[test]
    fn test_decide_requeue_when_young() {
        for (age, max) in [(0, 10), (59, 60), (1200, 3600), (3599, 3600)] {
            let max = Duration::from_secs(max);
            assert_eq!(
                decide(PodPhase::Failed, Duration::from_secs(age), max),
                EvictionDecision::RequeueAfter(requeue_interval(max))
            );
        }
    }

    #[test]
    fn test_decide_running_never_deleted() {
        for phase in [PodPhase::Running, PodPhase::Unknown] {
            assert_eq!(
                decide(phase, minutes(600), minutes(1)),
                EvictionDecision::Skip(SkipReason::IneligiblePhase(phase))
            );
        }
    }

    #[tokio::test]
    async fn test_young_failed_pod_requeued_after_one_minute() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "job-7");
        store.add_pod(key.clone(), PodPhase::Failed, created_ago(20));

        let requeued = reconciliation_count("pod", "requeued");

        let reconciler = reconciler(store.clone(), minutes(60));
        let requeue = assert_ok!(reconciler.reconcile(&key).await);

        assert_eq!(requeue, Some(minutes(1)));
        assert!(store.delete_calls().is_empty());
        assert!(reconciliation_count("pod", "requeued") > requeued);
    }

    #[tokio::test]
    async fn test_old_failed_pod_deleted() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "job-7");
        store.add_pod(key.clone(), PodPhase::Failed, created_ago(120));

        let reconciler = reconciler(store.clone(), minutes(60));
        let requeue = assert_ok!(reconciler.reconcile(&key).await);

        assert_eq!(requeue, None);
        assert_eq!(store.delete_calls(), vec![key.clone()]);
        assert!(!store.contains_pod(&key));
    }

    #[tokio::test]
    async fn test_protected_namespace_never_deleted() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("kube-system", "job-x");
        store.add_pod(key.clone(), PodPhase::Failed, created_ago(120));

        let reconciler = reconciler(store.clone(), Duration::ZERO);
        assert_eq!(assert_ok!(reconciler.reconcile(&key).await), None);

        assert!(store.delete_calls().is_empty());
        assert!(store.contains_pod(&key));
    }

    #[tokio::test]
    async fn test_running_pod_left_alone() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "web-0");
        store.add_pod(key.clone(), PodPhase::Running, created_ago(600));

        let reconciler = reconciler(store.clone(), minutes(1));
        assert_eq!(assert_ok!(reconciler.reconcile(&key).await), None);
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_pod_is_not_an_error() {
        let store = Arc::new(MockStore::new());
        let reconciler = reconciler(store.clone(), minutes(60));

        let requeue = assert_ok!(reconciler.reconcile(&ObjectKey::new("default", "gone")).await);
        assert_eq!(requeue, None);
    }

    #[tokio::test]
    async fn test_missing_creation_timestamp_is_an_error() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "no-timestamp");
        store.add_pod(key.clone(), PodPhase::Pending, None);
        let failed = reconciliation_count("pod", "missing_creation_timestamp");

        let reconciler = reconciler(store.clone(), minutes(60));
        let err = assert_err!(reconciler.reconcile(&key).await);

        assert_eq!(
            reconciliation_count("pod", "missing_creation_timestamp"),
            failed + 1
        );
        assert!(matches!(err, ReconcileError::MissingCreationTimestamp(k) if k == key));
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_returns_error() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "job-7");
        store.add_pod(key.clone(), PodPhase::Succeeded, created_ago(120));
        store.set_fail_delete(true);
        let failed = reconciliation_count("pod", "delete_failed");
        let failures = delete_failure_count();

        let reconciler = reconciler(store.clone(), minutes(60));
        let err = assert_err!(reconciler.reconcile(&key).await);

        assert!(matches!(err, ReconcileError::DeleteFailed { .. }));
        assert!(store.contains_pod(&key));
        assert_eq!(reconciliation_count("pod", "delete_failed"), failed + 1);
        assert!(delete_failure_count() > failures);
    }

    #[tokio::test]
    async fn test_delete_failure_requeue_policy() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "job-7");
        store.add_pod(key.clone(), PodPhase::Succeeded, created_ago(120));
        store.set_fail_delete(true);

        let reconciler =
            reconciler(store.clone(), minutes(60)).with_delete_failure_requeue(minutes(1));
        let requeue = assert_ok!(reconciler.reconcile(&key).await);

        assert_eq!(requeue, Some(minutes(1)));
    }

    #[tokio::test]
    async fn test_get_failure_is_an_error() {
        let store = Arc::new(MockStore::new());
        store.set_fail_get(true);

        let reconciler = reconciler(store.clone(), minutes(60));
        let err = assert_err!(reconciler.reconcile(&ObjectKey::new("default", "job-7")).await);
        assert!(matches!(err, ReconcileError::Store(_)));
    }

    #[tokio::test]
    async fn test_reconcile_twice_deletes_once() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "job-7");
        store.add_pod(key.clone(), PodPhase::Failed, created_ago(120));

        let reconciler = reconciler(store.clone(), minutes(60));
        assert_eq!(assert_ok!(reconciler.reconcile(&key).await), None);
        assert_eq!(assert_ok!(reconciler.reconcile(&key).await), None);

        assert_eq!(store.delete_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_twice_while_waiting_is_stable() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "job-7");
        store.add_pod(key.clone(), PodPhase::Pending, created_ago(5));

        let reconciler = reconciler(store.clone(), minutes(60));
        let first = assert_ok!(reconciler.reconcile(&key).await);
        let second = assert_ok!(reconciler.reconcile(&key).await);

        assert_eq!(first, second);
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_lowered_max_age_applies_on_next_invocation() {
        let store = Arc::new(MockStore::new());
        let key = ObjectKey::new("default", "job-7");
        store.add_pod(key.clone(), PodPhase::Failed, created_ago(20));

        let config = Arc::new(SharedConfig::new(minutes(60)));
        let reconciler = PodEvictionReconciler::new(
            store.clone(),
            config.clone(),
            Arc::new(MetricsRegistry::new()),
            PROTECTED,
        );

        assert_eq!(assert_ok!(reconciler.reconcile(&key).await), Some(minutes(1)));

        config.set_max_pod_age(minutes(10));
        assert_eq!(assert_ok!(reconciler.reconcile(&key).await), None);
        assert_eq!(store.delete_calls(), vec![key]);
    }

    #[test]
    fn test_evaluate_without_timestamp_ignores_running_pod() {
        let pod = PodInfo {
            key: ObjectKey::new("default", "web-0"),
            phase: PodPhase::Running,
            creation_timestamp: None,
        };

        assert_eq!(
            evaluate(&pod, Utc::now(), minutes(60)).unwrap(),
            EvictionDecision::Skip(SkipReason::IneligiblePhase(PodPhase::Running))
        );
    }
}
