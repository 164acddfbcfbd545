//! Shared data model for the plenuslb control plane: the CRD types the
//! controller manages, the cloud-adapter trait, and the retry/back-off value
//! type used throughout both binaries.

pub mod allocation;
pub mod metrics;
pub mod pool;
pub mod retry;

/// API group for all plenuslb custom resources.
pub const API_GROUP: &str = "plenus.io";
/// API version for all plenuslb custom resources.
pub const API_VERSION: &str = "v1alpha1";

/// Label placed on node-agent pods so the controller can find them.
pub const NODE_AGENT_LABEL: &str = "plenus.io/node-agent";
/// Name of the cluster-wide leader-election lease.
pub const LEADER_LEASE_NAME: &str = "plenus.io-leader-lease";
