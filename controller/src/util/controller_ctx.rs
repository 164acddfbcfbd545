use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod, Service};
use plenuslb_shared::k8s::api::{Api, IntoApi};
use plenuslb_shared::plenuslb::allocation::IPAllocation;
use plenuslb_shared::plenuslb::pool::{EphemeralIPPool, PersistentIPPool};
use tokio_util::sync::CancellationToken;

use super::agent_registry::AgentRegistry;
use super::lock_registry::LockRegistry;
use super::pool_tracker::PoolTracker;

/// Everything a cluster Kubernetes client needs to support for the
/// reconciliation engine. Generalizes the teacher's `ControllerKubeClient`
/// bound to this system's resource set.
pub trait ControllerKubeClient:
    IntoApi<IPAllocation>
    + IntoApi<PersistentIPPool>
    + IntoApi<EphemeralIPPool>
    + IntoApi<Service>
    + IntoApi<Pod>
    + IntoApi<Node>
{
}

impl<
        T: IntoApi<IPAllocation>
            + IntoApi<PersistentIPPool>
            + IntoApi<EphemeralIPPool>
            + IntoApi<Service>
            + IntoApi<Pod>
            + IntoApi<Node>,
    > ControllerKubeClient for T
{
}

/// Shared state handed to every reconciler and background task: the cluster
/// client, the in-memory tracker/lock/registry triple from §4.2-§4.4, and the
/// root cancellation scope tied to leader-lease loss (§5).
pub struct ControllerContext {
    pub client: Arc<dyn ControllerKubeClient>,
    pub pool_tracker: Arc<PoolTracker>,
    pub locks: Arc<LockRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub cancellation: CancellationToken,
    pub cluster_name: String,
}

impl ControllerContext {
    pub fn new(client: Arc<dyn ControllerKubeClient>, cluster_name: String) -> Self {
        ControllerContext {
            client,
            pool_tracker: Arc::new(PoolTracker::new()),
            locks: Arc::new(LockRegistry::new()),
            agents: Arc::new(AgentRegistry::new()),
            cancellation: CancellationToken::new(),
            cluster_name,
        }
    }

    // `Arc<dyn ControllerKubeClient>` implements `IntoApi<T>` for five
    // different `T`s, all sharing the method names `all`/`namespaced`/
    // `default_namespaced`; a bare `ctx.client.namespaced(...)` is ambiguous,
    // so reconcilers go through these typed accessors instead.

    pub fn allocations(&self, namespace: &str) -> Box<dyn Api<IPAllocation>> {
        IntoApi::<IPAllocation>::namespaced(self.client.as_ref(), namespace)
    }

    /// Cluster-wide view across all namespaces, used by watchers that need
    /// to scan every Allocation regardless of namespace (§4.1 pool events).
    pub fn allocations_all(&self) -> Box<dyn Api<IPAllocation>> {
        IntoApi::<IPAllocation>::all(self.client.as_ref())
    }

    pub fn persistent_pools(&self) -> Box<dyn Api<PersistentIPPool>> {
        IntoApi::<PersistentIPPool>::all(self.client.as_ref())
    }

    pub fn ephemeral_pools(&self) -> Box<dyn Api<EphemeralIPPool>> {
        IntoApi::<EphemeralIPPool>::all(self.client.as_ref())
    }

    pub fn services(&self, namespace: &str) -> Box<dyn Api<Service>> {
        IntoApi::<Service>::namespaced(self.client.as_ref(), namespace)
    }

    pub fn services_all(&self) -> Box<dyn Api<Service>> {
        IntoApi::<Service>::all(self.client.as_ref())
    }

    pub fn pods(&self, namespace: &str) -> Box<dyn Api<Pod>> {
        IntoApi::<Pod>::namespaced(self.client.as_ref(), namespace)
    }

    pub fn pods_all(&self) -> Box<dyn Api<Pod>> {
        IntoApi::<Pod>::all(self.client.as_ref())
    }

    /// Used by the allocator's cloud-only node pick (§4.4: "pick a random
    /// cluster node from the orchestrator's node list").
    pub fn nodes(&self) -> Box<dyn Api<Node>> {
        IntoApi::<Node>::all(self.client.as_ref())
    }
}
