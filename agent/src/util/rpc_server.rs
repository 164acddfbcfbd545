//! `NodeAgent` gRPC service, per §4.5. Thin translation layer between the
//! wire types and [`InterfaceStore`]; all the actual bookkeeping lives there.

use crate::util::interface_store::InterfaceStore;
use crate::util::kernel::Kernel;
use log::warn;
use plenuslb_agent_proto::node_agent_server::NodeAgent;
use plenuslb_agent_proto::{AddressInfo, CleanupInfo, Ping, Pong, Result as WireResult};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct NodeAgentService {
    store: Arc<InterfaceStore>,
    kernel: Arc<dyn Kernel>,
}

impl NodeAgentService {
    pub fn new(store: Arc<InterfaceStore>, kernel: Arc<dyn Kernel>) -> Self {
        Self { store, kernel }
    }
}

#[tonic::async_trait]
impl NodeAgent for NodeAgentService {
    async fn add_address(
        &self,
        request: Request<AddressInfo>,
    ) -> std::result::Result<Response<WireResult>, Status> {
        let info = request.into_inner();
        self.store
            .add_address(self.kernel.as_ref(), &info.interface, &info.address)
            .await
            .map_err(|e| {
                warn!("AddAddress({}, {}) failed: {e}", info.interface, info.address);
                Status::unavailable(e.to_string())
            })?;
        Ok(Response::new(WireResult {
            done: true,
            message: String::new(),
        }))
    }

    async fn remove_address(
        &self,
        request: Request<AddressInfo>,
    ) -> std::result::Result<Response<WireResult>, Status> {
        let info = request.into_inner();
        self.store
            .remove_address(self.kernel.as_ref(), &info.interface, &info.address)
            .await
            .map_err(|e| {
                warn!(
                    "RemoveAddress({}, {}) failed: {e}",
                    info.interface, info.address
                );
                Status::unavailable(e.to_string())
            })?;
        Ok(Response::new(WireResult {
            done: true,
            message: String::new(),
        }))
    }

    async fn cleanup(
        &self,
        request: Request<CleanupInfo>,
    ) -> std::result::Result<Response<WireResult>, Status> {
        let keep_these = request
            .into_inner()
            .keep_these
            .into_iter()
            .map(|a| (a.interface, a.address))
            .collect();
        self.store
            .cleanup(self.kernel.as_ref(), keep_these)
            .await
            .map_err(|e| {
                warn!("Cleanup failed: {e}");
                Status::unavailable(e.to_string())
            })?;
        Ok(Response::new(WireResult {
            done: true,
            message: String::new(),
        }))
    }

    async fn health_probe(
        &self,
        request: Request<Ping>,
    ) -> std::result::Result<Response<Pong>, Status> {
        Ok(Response::new(Pong {
            message: request.into_inner().message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::kernel::MockKernel;

    #[tokio::test]
    async fn add_address_translates_kernel_success_to_done() {
        let mut kernel = MockKernel::new();
        kernel.expect_add_address().returning(|_, _| Ok(()));
        let service = NodeAgentService::new(Arc::new(InterfaceStore::new()), Arc::new(kernel));

        let response = service
            .add_address(Request::new(AddressInfo {
                interface: "eth0".to_string(),
                address: "10.0.0.1".to_string(),
            }))
            .await
            .unwrap();
        assert!(response.into_inner().done);
    }

    #[tokio::test]
    async fn add_address_translates_kernel_failure_to_unavailable() {
        let mut kernel = MockKernel::new();
        kernel
            .expect_add_address()
            .returning(|_, _| Err(anyhow::anyhow!("netlink error")));
        let service = NodeAgentService::new(Arc::new(InterfaceStore::new()), Arc::new(kernel));

        let status = service
            .add_address(Request::new(AddressInfo {
                interface: "eth0".to_string(),
                address: "10.0.0.1".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn health_probe_echoes_the_ping() {
        let service =
            NodeAgentService::new(Arc::new(InterfaceStore::new()), Arc::new(MockKernel::new()));
        let response = service
            .health_probe(Request::new(Ping {
                message: "hello".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(response.into_inner().message, "hello");
    }
}
