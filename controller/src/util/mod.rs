pub mod agent_registry;
pub mod agent_speaker;
pub mod controller_ctx;
pub mod leader;
pub mod lock_registry;
pub mod pool_tracker;
pub mod reconcile_allocation;
pub mod reconcile_node_agent;
pub mod reconcile_pool;
pub mod reconcile_workload;
#[cfg(test)]
pub mod shared_test_utils;

pub use plenuslb_shared::error::{FailureKind, SharedError as ControllerError};

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;
