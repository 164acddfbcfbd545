//! Node-Agent Speaker: one RPC connection per call, 5-second deadline
//! (§4.4). Grounded on `pkg/controller/operatorSpeaker/speaker.go`'s
//! `EnsureIPAllocationOnNode`/`RemoveAddressFromNode`/`cleanup` helpers.

use super::agent_registry::{AgentInfo, AgentRegistry};
use log::{error, info, warn};
use plenuslb_agent_proto::node_agent_client::NodeAgentClient;
use plenuslb_agent_proto::{AddressInfo, CleanupInfo};
use plenuslb_shared::error::{FailureKind, SharedError};
use std::time::Duration;

const RPC_DEADLINE: Duration = Duration::from_secs(5);

pub async fn add_address(agent: &AgentInfo, interface: &str, address: &str) -> Result<(), SharedError> {
    let mut client = dial(agent).await?;
    let req = build_request(AddressInfo {
        interface: interface.to_string(),
        address: address.to_string(),
    });
    client.add_address(req).await.map_err(SharedError::from)?;
    info!(
        "added address {address} on interface {interface} of node {}",
        agent.node_name
    );
    Ok(())
}

pub async fn remove_address(
    agent: &AgentInfo,
    interface: &str,
    address: &str,
) -> Result<(), SharedError> {
    let mut client = dial(agent).await?;
    let req = build_request(AddressInfo {
        interface: interface.to_string(),
        address: address.to_string(),
    });
    client.remove_address(req).await.map_err(SharedError::from)?;
    info!(
        "removed address {address} from interface {interface} of node {}",
        agent.node_name
    );
    Ok(())
}

pub async fn cleanup(agent: &AgentInfo, keep_these: Vec<AddressInfo>) -> Result<(), SharedError> {
    let mut client = dial(agent).await?;
    let req = build_request(CleanupInfo { keep_these });
    client.cleanup(req).await.map_err(SharedError::from)?;
    Ok(())
}

/// `EnsureIPAllocationOnNode`: adds `address` on `interface_name` on the
/// target node if ready, and best-effort removes it from every other ready
/// agent so a relocation never leaves two owners.
pub async fn ensure_ip_allocation_on_node(
    registry: &AgentRegistry,
    node_name: &str,
    interface_name: &str,
    address: &str,
) -> Result<(), SharedError> {
    let target = registry.by_node_name(node_name);
    match &target {
        Some(agent) if agent.ready => {
            add_address(agent, interface_name, address).await?;
        }
        Some(_) => {
            return Err(SharedError::Rpc(tonic::Status::unavailable(format!(
                "node agent on {node_name} is not ready"
            ))));
        }
        None => {
            return Err(SharedError::Rpc(tonic::Status::unavailable(format!(
                "no node agent registered for node {node_name}"
            ))));
        }
    }

    for other in registry.all_except(node_name) {
        if !other.ready {
            continue;
        }
        if let Err(e) = remove_address(&other, interface_name, address).await {
            warn!(
                "best-effort remove of {address} from {} failed: {e}",
                other.node_name
            );
        }
    }
    Ok(())
}

async fn dial(agent: &AgentInfo) -> Result<NodeAgentClient<tonic::transport::Channel>, SharedError> {
    let endpoint = tonic::transport::Endpoint::from_shared(agent.endpoint())
        .map_err(|e| SharedError::Rpc(tonic::Status::invalid_argument(e.to_string())))?
        .timeout(RPC_DEADLINE);
    match endpoint.connect().await {
        Ok(channel) => Ok(NodeAgentClient::new(channel)),
        Err(e) => {
            error!("failed to dial node agent on {}: {e}", agent.node_name);
            Err(SharedError::Rpc(tonic::Status::unavailable(e.to_string())))
        }
    }
}

fn build_request<T>(message: T) -> tonic::Request<T> {
    let mut req = tonic::Request::new(message);
    req.set_timeout(RPC_DEADLINE);
    req
}

/// Whether a speaker error should be treated as NodeUnreachable (§7).
pub fn is_node_unreachable(e: &SharedError) -> bool {
    e.classify() == FailureKind::NodeUnreachable
}
