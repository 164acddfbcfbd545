//! Test-only `ControllerKubeClient` mock, one [`MockIntoApi`] per resource
//! type behind a single struct so reconciler tests can build a
//! `ControllerContext` without a live cluster.
//!
//! Grounded on `agent/src/util/discovery_configuration_controller.rs`'s
//! `MockDiscoveryConfigurationKubeClient`.

#[cfg(test)]
pub mod mock_client {
    use k8s_openapi::api::core::v1::{Node, Pod, Service};
    use plenuslb_shared::k8s::api::{Api, IntoApi, MockIntoApi};
    use plenuslb_shared::plenuslb::allocation::IPAllocation;
    use plenuslb_shared::plenuslb::pool::{EphemeralIPPool, PersistentIPPool};

    #[derive(Default)]
    pub struct MockControllerKubeClient {
        pub allocation: MockIntoApi<IPAllocation>,
        pub persistent_pool: MockIntoApi<PersistentIPPool>,
        pub ephemeral_pool: MockIntoApi<EphemeralIPPool>,
        pub service: MockIntoApi<Service>,
        pub pod: MockIntoApi<Pod>,
        pub node: MockIntoApi<Node>,
    }

    impl IntoApi<IPAllocation> for MockControllerKubeClient {
        fn all(&self) -> Box<dyn Api<IPAllocation>> {
            self.allocation.all()
        }
        fn namespaced(&self, namespace: &str) -> Box<dyn Api<IPAllocation>> {
            self.allocation.namespaced(namespace)
        }
        fn default_namespaced(&self) -> Box<dyn Api<IPAllocation>> {
            self.allocation.default_namespaced()
        }
    }

    impl IntoApi<PersistentIPPool> for MockControllerKubeClient {
        fn all(&self) -> Box<dyn Api<PersistentIPPool>> {
            self.persistent_pool.all()
        }
        fn namespaced(&self, namespace: &str) -> Box<dyn Api<PersistentIPPool>> {
            self.persistent_pool.namespaced(namespace)
        }
        fn default_namespaced(&self) -> Box<dyn Api<PersistentIPPool>> {
            self.persistent_pool.default_namespaced()
        }
    }

    impl IntoApi<EphemeralIPPool> for MockControllerKubeClient {
        fn all(&self) -> Box<dyn Api<EphemeralIPPool>> {
            self.ephemeral_pool.all()
        }
        fn namespaced(&self, namespace: &str) -> Box<dyn Api<EphemeralIPPool>> {
            self.ephemeral_pool.namespaced(namespace)
        }
        fn default_namespaced(&self) -> Box<dyn Api<EphemeralIPPool>> {
            self.ephemeral_pool.default_namespaced()
        }
    }

    impl IntoApi<Service> for MockControllerKubeClient {
        fn all(&self) -> Box<dyn Api<Service>> {
            self.service.all()
        }
        fn namespaced(&self, namespace: &str) -> Box<dyn Api<Service>> {
            self.service.namespaced(namespace)
        }
        fn default_namespaced(&self) -> Box<dyn Api<Service>> {
            self.service.default_namespaced()
        }
    }

    impl IntoApi<Pod> for MockControllerKubeClient {
        fn all(&self) -> Box<dyn Api<Pod>> {
            self.pod.all()
        }
        fn namespaced(&self, namespace: &str) -> Box<dyn Api<Pod>> {
            self.pod.namespaced(namespace)
        }
        fn default_namespaced(&self) -> Box<dyn Api<Pod>> {
            self.pod.default_namespaced()
        }
    }

    impl IntoApi<Node> for MockControllerKubeClient {
        fn all(&self) -> Box<dyn Api<Node>> {
            self.node.all()
        }
        fn namespaced(&self, namespace: &str) -> Box<dyn Api<Node>> {
            self.node.namespaced(namespace)
        }
        fn default_namespaced(&self) -> Box<dyn Api<Node>> {
            self.node.default_namespaced()
        }
    }
}
