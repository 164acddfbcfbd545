//! Node-Agent pod watcher: keeps [`super::agent_registry::AgentRegistry`]
//! current, and reacts to agent-lost / agent-gained transitions (§4.1 "For a
//! NodeAgent-lost event" / "For a NodeAgent-gained event").
//!
//! Grounded on the teacher's `util::node_watcher` watch loop, generalized
//! from Node objects to the node-agent DaemonSet's Pods, and on
//! `pkg/controller/operator/operatorslist.go`'s readiness-gated directory.

use super::agent_registry::AgentInfo;
use super::agent_speaker;
use super::controller_ctx::ControllerContext;
use super::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use log::{info, warn};
use plenuslb_agent_proto::AddressInfo;
use plenuslb_shared::plenuslb::allocation::AllocationState;
use std::sync::Arc;

pub const NODE_AGENT_LABEL_SELECTOR: &str = "app=plenuslb-node-agent";

pub async fn run(ctx: Arc<ControllerContext>) {
    let api = ctx.pods_all().as_inner();
    let config = watcher::Config::default().labels(NODE_AGENT_LABEL_SELECTOR);
    let mut stream = Box::pin(watcher::watcher(api, config).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(pod)) | Ok(watcher::Event::InitApply(pod)) => {
                if let Err(e) = on_agent_seen(&pod, ctx.clone()).await {
                    warn!("node-agent pod {} reconcile failed: {e}", pod.name_any());
                }
            }
            Ok(watcher::Event::Delete(pod)) => {
                on_agent_removed(&pod, ctx.clone()).await;
            }
            Ok(_) => {}
            Err(e) => warn!("node-agent pod watch error: {e}"),
        }
    }
}

fn pod_info(pod: &Pod) -> Option<AgentInfo> {
    let node_name = pod.spec.as_ref()?.node_name.clone()?;
    let pod_ip = pod.status.as_ref()?.pod_ip.clone()?;
    let ready = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);
    Some(AgentInfo {
        pod_ip,
        node_name,
        ready,
    })
}

async fn on_agent_seen(pod: &Pod, ctx: Arc<ControllerContext>) -> Result<()> {
    let Some(info) = pod_info(pod) else {
        return Ok(());
    };
    let pod_name = pod.name_any();
    let was_known = ctx.agents.by_node_name(&info.node_name).is_some();
    ctx.agents.upsert(pod_name, info.clone());

    if !was_known && info.ready {
        info!("node agent on {} gained; sweeping with a cleanup call", info.node_name);
        if let Err(e) = sweep_node(&info, ctx.clone()).await {
            warn!("cleanup sweep for node {} failed: {e}", info.node_name);
        }
    }
    Ok(())
}

async fn on_agent_removed(pod: &Pod, ctx: Arc<ControllerContext>) {
    let pod_name = pod.name_any();
    let Some(info) = ctx.agents.remove(&pod_name) else {
        return;
    };
    warn!("node agent on {} lost; marking its bindings NodeError", info.node_name);
    if let Err(e) = mark_node_bindings_errored(&info.node_name, ctx).await {
        warn!("failed to mark bindings on lost node {}: {e}", info.node_name);
    }
}

/// §4.1 "collect every address that should remain on that node, and ask the
/// new agent to Cleanup-with-exceptions those".
async fn sweep_node(agent: &AgentInfo, ctx: Arc<ControllerContext>) -> Result<()> {
    let all = ctx.allocations_all().list().await?.items;
    let keep_these: Vec<AddressInfo> = all
        .iter()
        .flat_map(|a| a.spec.allocations.iter())
        .filter(|b| b.node_name.as_deref() == Some(agent.node_name.as_str()))
        .filter_map(|b| {
            b.interface_name
                .clone()
                .map(|interface| AddressInfo {
                    interface,
                    address: b.address.clone(),
                })
        })
        .collect();
    agent_speaker::cleanup(agent, keep_these).await?;
    Ok(())
}

async fn mark_node_bindings_errored(node_name: &str, ctx: Arc<ControllerContext>) -> Result<()> {
    let all = ctx.allocations_all().list().await?.items;
    for allocation in all {
        let on_node = allocation
            .spec
            .allocations
            .iter()
            .any(|b| b.node_name.as_deref() == Some(node_name));
        if !on_node {
            continue;
        }
        let namespace = allocation.namespace().unwrap_or_default();
        let name = allocation.name_any();
        let Some(_lock) = ctx
            .locks
            .acquire(&namespace, &name, "reconcile_node_agent")
            .await
        else {
            warn!("lock contended for {namespace}/{name}; skipping, a future node-agent event will retry");
            continue;
        };
        let api = ctx.allocations(&namespace);
        if let Some(mut current) = api.get(&name).await? {
            let mut status = current.status.take().unwrap_or_default();
            status.state = Some(AllocationState::NodeError);
            status.message = format!("node {node_name} lost");
            current.status = Some(status);
            api.apply(current, "plenuslb-controller").await?;
        }
    }
    Ok(())
}
