//! Reconciliation Engine, Workload half (§4.1): watches `core/v1 Service`
//! objects of type `LoadBalancer` ("Workloads" in the design) and keeps
//! exactly one [`IPAllocation`] per load-balancer workload.
//!
//! Grounded on the teacher's `util::node_watcher` for the watch/finalizer
//! skeleton and on `pkg/controller/servicewatcher/servicewatcher.go` /
//! `pkg/controller/utils/utils.go` for which Service fields decide
//! Persistent vs Ephemeral and where ingress addresses are written back.

use super::controller_ctx::ControllerContext;
use super::{ControllerError, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus,
};
use kube::api::{Patch, PatchParams};
use kube::runtime::{
    controller::{Action, Controller},
    finalizer::{finalizer, Event},
    watcher::Config,
};
use kube::ResourceExt;
use log::{error, info, trace, warn};
use plenuslb_shared::plenuslb::allocation::{
    AddrBinding, AllocationState, IPAllocation, IpAllocationSpec, IpAllocationStatus, IpType,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub static WORKLOAD_FINALIZER: &str = "plenus.io/workload";

pub async fn run(ctx: Arc<ControllerContext>) {
    let api = ctx.services_all().as_inner();
    Controller::new(api, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|res| async move { std::result::Result::ok(res) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

fn error_policy(_svc: Arc<Service>, error: &ControllerError, _ctx: Arc<ControllerContext>) -> Action {
    warn!("workload reconcile failed: {error}");
    Action::requeue(Duration::from_secs(30))
}

pub async fn reconcile(svc: Arc<Service>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let api = ctx.services(&svc.namespace().unwrap_or_default());
    finalizer(&api.as_inner(), WORKLOAD_FINALIZER, svc, |event| {
        reconcile_inner(event, ctx.clone())
    })
    .await
    .map_err(|e| ControllerError::Finalizer(Box::new(e)))
}

async fn reconcile_inner(event: Event<Service>, ctx: Arc<ControllerContext>) -> Result<Action> {
    match event {
        Event::Apply(svc) => handle_apply(&svc, ctx).await,
        Event::Cleanup(svc) => handle_cleanup(&svc, ctx).await,
    }
}

fn is_load_balancer(svc: &Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .map(|t| t == "LoadBalancer")
        .unwrap_or(false)
}

fn external_addresses(svc: &Service) -> Vec<String> {
    svc.spec
        .as_ref()
        .and_then(|s| s.external_i_ps.clone())
        .unwrap_or_default()
}

/// The type a workload's externalAddresses imply: Persistent when
/// non-empty, Ephemeral (single, cloud-minted) otherwise (§4.1).
fn expected_type(svc: &Service) -> IpType {
    if external_addresses(svc).is_empty() {
        IpType::Ephemeral
    } else {
        IpType::Persistent
    }
}

async fn handle_apply(svc: &Service, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = svc.namespace().unwrap_or_default();
    let name = svc.name_any();
    let allocations = ctx.allocations(&namespace);

    if !is_load_balancer(svc) {
        if allocations.get(&name).await?.is_some() {
            info!("workload {namespace}/{name} is no longer a load-balancer; deleting allocation");
            delete_allocation_and_clear_ingress(svc, ctx.clone()).await?;
        }
        return Ok(Action::await_change());
    }

    match allocations.get(&name).await? {
        None => {
            info!("workload {namespace}/{name} is a new load-balancer; creating allocation");
            create_allocation(svc, ctx.clone()).await?;
        }
        Some(existing) => {
            let observed_type = existing.spec.ip_type;
            let wanted_type = expected_type(svc);
            if observed_type != wanted_type {
                info!(
                    "workload {namespace}/{name} changed type {observed_type:?} -> {wanted_type:?}; \
                     deleting and recreating"
                );
                allocations.delete(&name).await?;
            } else if observed_type == IpType::Persistent {
                reconcile_persistent_drift(svc, &existing, ctx.clone()).await?;
            }
            // Ephemeral allocations carry no externalAddresses to diff against
            // here; re-patching them on pool-shape change is handled by the
            // pool watcher (reconcile_pool::on_ephemeral_modified).
        }
    }
    Ok(Action::await_change())
}

/// §4.1 drift reconciliation for a type-stable Persistent allocation: adds
/// bindings for newly-listed `externalIPs`, releases and drops bindings for
/// ones no longer listed, then re-pends the allocation so the allocator
/// resolves the new bindings.
async fn reconcile_persistent_drift(
    svc: &Service,
    existing: &IPAllocation,
    ctx: Arc<ControllerContext>,
) -> Result<()> {
    let namespace = svc.namespace().unwrap_or_default();
    let name = svc.name_any();
    let wanted: BTreeSet<String> = external_addresses(svc).into_iter().collect();
    let have: BTreeSet<String> = existing.spec.allocations.iter().map(|b| b.address.clone()).collect();
    if wanted == have {
        return Ok(());
    }
    info!("workload {namespace}/{name} external address set changed; re-deriving allocation");

    let Some(_lock) = ctx
        .locks
        .acquire(&namespace, &name, "reconcile_workload::drift")
        .await
    else {
        warn!("lock contended for {namespace}/{name}; address drift will be retried on the next workload event");
        return Ok(());
    };
    let allocations = ctx.allocations(&namespace);
    let Some(mut current) = allocations.get(&name).await? else {
        return Ok(());
    };

    for binding in current.spec.allocations.iter().filter(|b| !wanted.contains(&b.address)) {
        if let Some(pool_name) = binding.pool.as_deref() {
            let spec = ctx.persistent_pools().get(pool_name).await?.map(|p| p.spec);
            ctx.pool_tracker.release_ip(pool_name, &binding.address, spec.as_ref());
        }
    }
    current.spec.allocations.retain(|b| wanted.contains(&b.address));
    for address in &wanted {
        if !current.spec.allocations.iter().any(|b| &b.address == address) {
            current.spec.allocations.push(AddrBinding {
                address: address.clone(),
                ..Default::default()
            });
        }
    }

    let mut status = current.status.take().unwrap_or_default();
    status.state = Some(AllocationState::Pending);
    status.message = "re-deriving after workload address drift".to_string();
    current.status = Some(status);
    allocations.apply(current, "plenuslb-controller").await?;
    Ok(())
}

async fn handle_cleanup(svc: &Service, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = svc.namespace().unwrap_or_default();
    let name = svc.name_any();
    trace!("workload {namespace}/{name} deleted; removing allocation if present");
    let allocations = ctx.allocations(&namespace);
    if allocations.get(&name).await?.is_some() {
        allocations.delete(&name).await?;
    }
    Ok(Action::await_change())
}

async fn create_allocation(svc: &Service, ctx: Arc<ControllerContext>) -> Result<()> {
    let namespace = svc.namespace().unwrap_or_default();
    let name = svc.name_any();
    let ip_type = expected_type(svc);
    let addresses = external_addresses(svc);

    let allocations: Vec<AddrBinding> = match ip_type {
        IpType::Persistent => addresses
            .into_iter()
            .map(|address| AddrBinding {
                address,
                ..Default::default()
            })
            .collect(),
        IpType::Ephemeral => Vec::new(),
    };

    let allocation = plenuslb_shared::plenuslb::allocation::IPAllocation::new(
        &name,
        IpAllocationSpec {
            ip_type,
            allocations,
        },
    );
    let mut allocation = allocation;
    allocation.status = Some(IpAllocationStatus {
        state: Some(plenuslb_shared::plenuslb::allocation::AllocationState::Pending),
        message: String::new(),
    });

    let api = ctx.allocations(&namespace);
    api.apply(allocation, "plenuslb-controller").await?;
    Ok(())
}

async fn delete_allocation_and_clear_ingress(svc: &Service, ctx: Arc<ControllerContext>) -> Result<()> {
    let namespace = svc.namespace().unwrap_or_default();
    let name = svc.name_any();
    let allocations = ctx.allocations(&namespace);
    if let Some(existing) = allocations.get(&name).await? {
        if existing.spec.ip_type == IpType::Ephemeral {
            clear_ingress(svc, ctx.clone()).await?;
        }
        allocations.delete(&name).await?;
    }
    Ok(())
}

/// Writes an empty ingress list back onto the Service (§4.1 "clearing
/// ingress addresses when the prior allocation was Ephemeral").
pub async fn clear_ingress(svc: &Service, ctx: Arc<ControllerContext>) -> Result<()> {
    write_ingress(svc, ctx, Vec::new()).await
}

/// Writes the given addresses into `status.loadBalancer.ingress`, the
/// workload's ingress-addresses list (§3 "exposes an ingress-addresses list
/// the core mutates").
pub async fn write_ingress(
    svc: &Service,
    ctx: Arc<ControllerContext>,
    addresses: Vec<String>,
) -> Result<()> {
    let namespace = svc.namespace().unwrap_or_default();
    let name = svc.name_any();
    let services = ctx.services(&namespace);

    let ingress: Vec<LoadBalancerIngress> = addresses
        .into_iter()
        .map(|ip| LoadBalancerIngress {
            ip: Some(ip),
            ..Default::default()
        })
        .collect();
    let status = serde_json::json!({
        "status": ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(ingress),
            }),
            ..Default::default()
        }
    });
    let patch = Patch::Merge(&status);
    if let Err(e) = services
        .raw_patch(&name, &patch, &PatchParams::default())
        .await
    {
        error!("failed to patch ingress for {namespace}/{name}: {e}");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;

    fn svc(type_: Option<&str>, external_ips: Vec<&str>) -> Service {
        Service {
            spec: Some(ServiceSpec {
                type_: type_.map(str::to_string),
                external_i_ps: if external_ips.is_empty() {
                    None
                } else {
                    Some(external_ips.into_iter().map(str::to_string).collect())
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn non_load_balancer_is_not_a_workload() {
        assert!(!is_load_balancer(&svc(Some("ClusterIP"), vec![])));
        assert!(is_load_balancer(&svc(Some("LoadBalancer"), vec![])));
    }

    #[test]
    fn empty_external_addresses_means_ephemeral() {
        assert_eq!(expected_type(&svc(Some("LoadBalancer"), vec![])), IpType::Ephemeral);
    }

    #[test]
    fn non_empty_external_addresses_means_persistent() {
        assert_eq!(
            expected_type(&svc(Some("LoadBalancer"), vec!["1.2.3.4"])),
            IpType::Persistent
        );
    }
}
