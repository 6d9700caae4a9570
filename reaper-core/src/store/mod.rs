//! Object store abstraction layer
//!
//! Provides the fetch/delete seam the reconcilers run against. The Kubernetes
//! implementation lives in `reaper-k8s`; `MockStore` backs the tests.

mod interface;
mod mock;

pub use interface::*;
pub use mock::MockStore;
