//! Reconciliation errors
//!
//! Every variant is handed back to the controller runtime, which retries
//! after its error policy delay. Input errors in the configuration object are
//! not represented here: they are logged and absorbed by the config sync.

use thiserror::Error;

use crate::store::{ObjectKey, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The pod has no creation timestamp, so its age cannot be computed
    #[error("pod {0} has no creation timestamp")]
    MissingCreationTimestamp(ObjectKey),

    /// The delete request for an expired pod could not be sent
    #[error("failed to delete pod {key}")]
    DeleteFailed {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    /// The object store could not be read
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The watched object carries no namespace or name
    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),
}

impl ReconcileError {
    /// Short label used for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcileError::MissingCreationTimestamp(_) => "missing_creation_timestamp",
            ReconcileError::DeleteFailed { .. } => "delete_failed",
            ReconcileError::Store(_) => "store_error",
            ReconcileError::MissingObjectKey(_) => "missing_object_key",
        }
    }
}
